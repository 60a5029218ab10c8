use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use quill_db::models::PostRow;
use quill_types::api::{CreatePostRequest, PostResponse, TagResponse, UpdatePostRequest};
use quill_types::validate;

use crate::error::{ApiError, ApiResult, validated};
use crate::state::{AppState, run_db};
use crate::tags::to_tag_response;
use crate::util;

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    /// Case-insensitive substring filter over title and content.
    pub q: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    validated(validate::create_post(&req))?;

    let id = Uuid::new_v4();
    let created_at = util::now_rfc3339();

    // Blank tag names are dropped rather than rejected, matching the
    // comma-separated tags field this grew out of.
    let tag_names: Vec<String> = req
        .tags
        .iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    let author_id = req.author_id.map(|id| id.to_string());
    let topic_id = req.topic_id.map(|id| id.to_string());

    let tags = {
        let id = id.to_string();
        let title = req.title.clone();
        let content = req.content.clone();
        let created_at = created_at.clone();
        run_db(&state, move |db| {
            db.create_post(
                &id,
                &title,
                &content,
                author_id.as_deref(),
                topic_id.as_deref(),
                &created_at,
                &tag_names,
            )
        })
        .await?
    };

    state.cache.invalidate();

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            id,
            title: req.title,
            content: req.content,
            author_id: req.author_id,
            topic_id: req.topic_id,
            created_at: util::parse_created_at(&created_at),
            tags: tags.into_iter().map(to_tag_response).collect(),
        }),
    ))
}

/// Listing and search share this handler; both go through the cache.
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
) -> ApiResult<Response> {
    let limit = query.limit.min(200);
    let q = query.q.as_deref().unwrap_or("").trim().to_string();
    let cache_key = format!("posts?q={}&limit={}", q, limit);

    if let Some(body) = state.cache.get(&cache_key) {
        return Ok(json_body(body));
    }

    let filter = if q.is_empty() { None } else { Some(q) };
    let rows = run_db(&state, move |db| db.list_posts(filter.as_deref(), limit)).await?;
    let posts = with_tags(&state, rows).await?;

    let body = serde_json::to_string(&posts).map_err(|e| ApiError::Internal(e.into()))?;
    state.cache.insert(cache_key, body.clone());
    Ok(json_body(body))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<PostResponse>> {
    let id = post_id.to_string();
    let (row, tags) = run_db(&state, move |db| {
        let row = db.get_post(&id)?;
        let tags = db.list_tags_for_post(&id)?;
        Ok((row, tags))
    })
    .await?;

    Ok(Json(to_post_response(
        row,
        tags.into_iter().map(to_tag_response).collect(),
    )))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<UpdatePostRequest>,
) -> ApiResult<Json<PostResponse>> {
    validated(validate::update_post(&req.title, &req.content))?;

    let id = post_id.to_string();
    let (row, tags) = run_db(&state, move |db| {
        let row = db.update_post(&id, req.title.as_deref(), req.content.as_deref())?;
        let tags = db.list_tags_for_post(&row.id)?;
        Ok((row, tags))
    })
    .await?;

    state.cache.invalidate();

    Ok(Json(to_post_response(
        row,
        tags.into_iter().map(to_tag_response).collect(),
    )))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let id = post_id.to_string();
    run_db(&state, move |db| db.delete_post(&id)).await?;

    state.cache.invalidate();
    Ok(StatusCode::NO_CONTENT)
}

/// Resolve tags for a page of posts with one batched query.
pub(crate) async fn with_tags(
    state: &AppState,
    rows: Vec<PostRow>,
) -> ApiResult<Vec<PostResponse>> {
    let post_ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
    let pairs = run_db(state, move |db| db.get_tags_for_posts(&post_ids)).await?;

    let mut tag_map: HashMap<String, Vec<TagResponse>> = HashMap::new();
    for (post_id, tag) in pairs {
        tag_map.entry(post_id).or_default().push(to_tag_response(tag));
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let tags = tag_map.remove(&row.id).unwrap_or_default();
            to_post_response(row, tags)
        })
        .collect())
}

pub(crate) fn to_post_response(row: PostRow, tags: Vec<TagResponse>) -> PostResponse {
    PostResponse {
        id: util::parse_id(&row.id, "post"),
        title: row.title,
        content: row.content,
        author_id: util::parse_opt_id(row.author_id.as_deref(), "user"),
        topic_id: util::parse_opt_id(row.topic_id.as_deref(), "topic"),
        created_at: util::parse_created_at(&row.created_at),
        tags,
    }
}

fn json_body(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}
