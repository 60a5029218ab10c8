use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use quill_db::models::UserRow;
use quill_types::api::{CreateUserRequest, UpdateUserRequest, UserResponse};
use quill_types::validate;

use crate::error::{ApiResult, validated};
use crate::state::{AppState, run_db};
use crate::util;

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    validated(validate::create_user(&req))?;

    let id = Uuid::new_v4();
    let created_at = util::now_rfc3339();

    {
        let id = id.to_string();
        let username = req.username.clone();
        let created_at = created_at.clone();
        run_db(&state, move |db| db.create_user(&id, &username, &created_at)).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id,
            username: req.username,
            created_at: util::parse_created_at(&created_at),
        }),
    ))
}

pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserResponse>>> {
    let rows = run_db(&state, move |db| db.list_users()).await?;
    Ok(Json(rows.into_iter().map(to_user_response).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserResponse>> {
    let id = user_id.to_string();
    let row = run_db(&state, move |db| db.get_user(&id)).await?;
    Ok(Json(to_user_response(row)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    validated(validate::update_user(&req.username))?;

    let id = user_id.to_string();
    let row = run_db(&state, move |db| db.update_user(&id, req.username.as_deref())).await?;
    Ok(Json(to_user_response(row)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let id = user_id.to_string();
    run_db(&state, move |db| db.delete_user(&id)).await?;

    // Authored posts are detached by the delete, which changes listing
    // payloads.
    state.cache.invalidate();
    Ok(StatusCode::NO_CONTENT)
}

fn to_user_response(row: UserRow) -> UserResponse {
    UserResponse {
        id: util::parse_id(&row.id, "user"),
        username: row.username,
        created_at: util::parse_created_at(&row.created_at),
    }
}
