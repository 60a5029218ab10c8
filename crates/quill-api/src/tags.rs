use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use quill_db::models::TagRow;
use quill_types::api::{AttachTagRequest, TagResponse};
use quill_types::validate;

use crate::error::{ApiResult, validated};
use crate::state::{AppState, run_db};
use crate::util;

/// Idempotent: the tag is created lazily on first use and re-attaching an
/// already-linked tag is a no-op.
pub async fn attach_tag(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<AttachTagRequest>,
) -> ApiResult<impl IntoResponse> {
    validated(validate::attach_tag(&req.name))?;

    let id = post_id.to_string();
    let name = req.name.trim().to_string();
    let tag = run_db(&state, move |db| db.associate_tag(&id, &name)).await?;

    state.cache.invalidate();
    Ok(Json(to_tag_response(tag)))
}

pub async fn list_post_tags(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TagResponse>>> {
    let id = post_id.to_string();
    let tags = run_db(&state, move |db| db.list_tags_for_post(&id)).await?;
    Ok(Json(tags.into_iter().map(to_tag_response).collect()))
}

pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<TagResponse>>> {
    let tags = run_db(&state, move |db| db.list_tags()).await?;
    Ok(Json(tags.into_iter().map(to_tag_response).collect()))
}

pub async fn get_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<Uuid>,
) -> ApiResult<Json<TagResponse>> {
    let id = tag_id.to_string();
    let tag = run_db(&state, move |db| db.get_tag(&id)).await?;
    Ok(Json(to_tag_response(tag)))
}

pub(crate) fn to_tag_response(row: TagRow) -> TagResponse {
    TagResponse {
        id: util::parse_id(&row.id, "tag"),
        name: row.name,
    }
}
