use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use quill_db::models::TopicRow;
use quill_types::api::{CreateTopicRequest, PostResponse, TopicResponse, UpdateTopicRequest};
use quill_types::validate;

use crate::error::{ApiResult, validated};
use crate::posts::with_tags;
use crate::state::{AppState, run_db};
use crate::util;

pub async fn create_topic(
    State(state): State<AppState>,
    Json(req): Json<CreateTopicRequest>,
) -> ApiResult<impl IntoResponse> {
    validated(validate::create_topic(&req))?;

    let id = Uuid::new_v4();
    let created_at = util::now_rfc3339();

    {
        let id = id.to_string();
        let title = req.title.clone();
        let created_at = created_at.clone();
        run_db(&state, move |db| db.create_topic(&id, &title, &created_at)).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(TopicResponse {
            id,
            title: req.title,
            created_at: util::parse_created_at(&created_at),
        }),
    ))
}

pub async fn list_topics(State(state): State<AppState>) -> ApiResult<Json<Vec<TopicResponse>>> {
    let rows = run_db(&state, move |db| db.list_topics()).await?;
    Ok(Json(rows.into_iter().map(to_topic_response).collect()))
}

pub async fn get_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<Uuid>,
) -> ApiResult<Json<TopicResponse>> {
    let id = topic_id.to_string();
    let row = run_db(&state, move |db| db.get_topic(&id)).await?;
    Ok(Json(to_topic_response(row)))
}

pub async fn list_topic_posts(
    State(state): State<AppState>,
    Path(topic_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    let id = topic_id.to_string();
    let rows = run_db(&state, move |db| db.list_posts_for_topic(&id)).await?;
    Ok(Json(with_tags(&state, rows).await?))
}

pub async fn update_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<Uuid>,
    Json(req): Json<UpdateTopicRequest>,
) -> ApiResult<Json<TopicResponse>> {
    validated(validate::update_topic(&req.title))?;

    let id = topic_id.to_string();
    let row = run_db(&state, move |db| db.update_topic(&id, req.title.as_deref())).await?;
    Ok(Json(to_topic_response(row)))
}

pub async fn delete_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let id = topic_id.to_string();
    run_db(&state, move |db| db.delete_topic(&id)).await?;

    // Detached posts change listing payloads.
    state.cache.invalidate();
    Ok(StatusCode::NO_CONTENT)
}

fn to_topic_response(row: TopicRow) -> TopicResponse {
    TopicResponse {
        id: util::parse_id(&row.id, "topic"),
        title: row.title,
        created_at: util::parse_created_at(&row.created_at),
    }
}
