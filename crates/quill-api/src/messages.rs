use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use quill_db::models::MessageRow;
use quill_types::api::{MessageResponse, SendMessageRequest};
use quill_types::validate;

use crate::error::{ApiResult, validated};
use crate::state::{AppState, run_db};
use crate::util;

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub user_id: Uuid,
    pub peer_id: Uuid,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    validated(validate::send_message(&req))?;

    let id = Uuid::new_v4();
    let created_at = util::now_rfc3339();

    let row = {
        let id = id.to_string();
        let sender_id = req.sender_id.to_string();
        let recipient_id = req.recipient_id.to_string();
        let created_at = created_at.clone();
        run_db(&state, move |db| {
            db.create_message(&id, &sender_id, &recipient_id, &req.content, &created_at)
        })
        .await?
    };

    Ok((StatusCode::CREATED, Json(to_message_response(row))))
}

/// Both directions of the two-user conversation, newest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let user_id = query.user_id.to_string();
    let peer_id = query.peer_id.to_string();
    let limit = query.limit.min(200);

    let rows = run_db(&state, move |db| {
        db.list_conversation(&user_id, &peer_id, limit)
    })
    .await?;

    Ok(Json(rows.into_iter().map(to_message_response).collect()))
}

fn to_message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: util::parse_id(&row.id, "message"),
        sender_id: util::parse_id(&row.sender_id, "user"),
        sender_username: row.sender_username,
        recipient_id: util::parse_id(&row.recipient_id, "user"),
        recipient_username: row.recipient_username,
        content: row.content,
        created_at: util::parse_created_at(&row.created_at),
    }
}
