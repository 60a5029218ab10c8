use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use quill_db::models::CommentRow;
use quill_types::api::{CommentResponse, CreateCommentRequest};
use quill_types::validate;

use crate::error::{ApiResult, validated};
use crate::state::{AppState, run_db};
use crate::util;

pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    validated(validate::create_comment(&req))?;

    let id = Uuid::new_v4();
    let created_at = util::now_rfc3339();

    {
        let id = id.to_string();
        let pid = post_id.to_string();
        let author = req.author.clone();
        let content = req.content.clone();
        let created_at = created_at.clone();
        run_db(&state, move |db| {
            db.create_comment(&id, &pid, &author, &content, &created_at)
        })
        .await?;
    }

    state.cache.invalidate();

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            id,
            post_id,
            author: req.author,
            content: req.content,
            created_at: util::parse_created_at(&created_at),
        }),
    ))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Vec<CommentResponse>>> {
    let id = post_id.to_string();
    let rows = run_db(&state, move |db| db.list_comments_for_post(&id)).await?;
    Ok(Json(rows.into_iter().map(to_comment_response).collect()))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
) -> ApiResult<Json<CommentResponse>> {
    let id = comment_id.to_string();
    let row = run_db(&state, move |db| db.get_comment(&id)).await?;
    Ok(Json(to_comment_response(row)))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let id = comment_id.to_string();
    run_db(&state, move |db| db.delete_comment(&id)).await?;

    state.cache.invalidate();
    Ok(StatusCode::NO_CONTENT)
}

fn to_comment_response(row: CommentRow) -> CommentResponse {
    CommentResponse {
        id: util::parse_id(&row.id, "comment"),
        post_id: util::parse_id(&row.post_id, "post"),
        author: row.author,
        content: row.content,
        created_at: util::parse_created_at(&row.created_at),
    }
}
