/// Chat endpoints
///
/// - `GET  /api/chat/rooms` - rooms the caller is in, most recent activity first
/// - `POST /api/chat/direct` - get or create the direct room with a colleague
/// - `GET  /api/chat/rooms/:id` - room with participants
/// - `GET  /api/chat/rooms/:id/messages?before=&limit=` - message history
/// - `POST /api/chat/rooms/:id/messages` - send a message
/// - `POST /api/chat/rooms/:id/read` - move the caller's read marker
///
/// Messages sent here and over the socket take the same path
/// ([`post_message`]): persisted first, then broadcast to the room.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use nexusflow_shared::{
    auth::{authorization::require_active_member, middleware::AuthContext},
    events::{normalize_body, Channel, ServerEvent},
    models::{
        chat::{ChatMessage, ChatParticipant, ChatRoom, ChatRoomKind, ChatRoomSummary, MessagePage, DEFAULT_PAGE_SIZE},
        user::User,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct RoomListQuery {
    pub kind: Option<ChatRoomKind>,
}

#[derive(Debug, Deserialize)]
pub struct DirectRoomRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RoomDetail {
    #[serde(flatten)]
    pub room: ChatRoom,
    pub participants: Vec<ChatParticipant>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    /// Message ID; returns messages older than this one
    pub before: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, message = "Message cannot be empty"))]
    pub body: String,

    #[validate(length(max = 64, message = "client_id must be at most 64 characters"))]
    pub client_id: Option<String>,
}

/// Loads a room of the caller's organization that the caller participates in.
/// Deactivated callers are refused even when they are still listed.
pub(crate) async fn room_for_participant(
    state: &AppState,
    auth: &AuthContext,
    room_id: Uuid,
) -> ApiResult<ChatRoom> {
    require_active_member(&state.db, auth).await?;

    let room = ChatRoom::find_by_id_and_org(&state.db, room_id, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Chat room not found".to_string()))?;

    if !ChatParticipant::is_participant(&state.db, room.id, auth.user_id).await? {
        return Err(ApiError::Forbidden("Not a participant of this room".to_string()));
    }

    Ok(room)
}

/// Persists a message from the caller and broadcasts `new-message` to the room
pub(crate) async fn post_message(
    state: &AppState,
    auth: &AuthContext,
    room_id: Uuid,
    body: &str,
    client_id: Option<String>,
) -> ApiResult<ChatMessage> {
    let body = normalize_body(body)?;
    let room = room_for_participant(state, auth, room_id).await?;

    let message = ChatMessage::create(&state.db, room.id, auth.user_id, &body).await?;

    let reached = state.hub.publish(
        Channel::Room(room.id),
        ServerEvent::NewMessage {
            message: message.clone(),
            client_id,
        },
    );

    tracing::debug!(
        room_id = %room.id,
        message_id = %message.id,
        reached,
        "Message posted"
    );

    Ok(message)
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<RoomListQuery>,
) -> ApiResult<Json<Vec<ChatRoomSummary>>> {
    require_active_member(&state.db, &auth).await?;
    let rooms = ChatRoom::list_for_user(&state.db, auth.user_id, query.kind).await?;
    Ok(Json(rooms))
}

/// Get or create a direct room
///
/// ```text
/// POST /api/chat/direct
/// { "user_id": "uuid" }
/// ```
///
/// The peer must be an active member of the caller's organization. Both
/// orders of the pair resolve to the same room.
///
/// # Errors
///
/// - `400 Bad Request`: chatting with yourself
/// - `404 Not Found`: no such colleague
pub async fn open_direct(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<DirectRoomRequest>,
) -> ApiResult<Json<ChatRoom>> {
    require_active_member(&state.db, &auth).await?;

    if req.user_id == auth.user_id {
        return Err(ApiError::BadRequest("Cannot open a direct chat with yourself".to_string()));
    }

    let peer = User::find_by_id_and_org(&state.db, req.user_id, auth.organization_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let room = ChatRoom::find_or_create_direct(&state.db, auth.organization_id, auth.user_id, peer.id).await?;
    Ok(Json(room))
}

pub async fn get_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Json<RoomDetail>> {
    let room = room_for_participant(&state, &auth, room_id).await?;
    let participants = ChatParticipant::list(&state.db, room.id).await?;

    Ok(Json(RoomDetail { room, participants }))
}

/// Message history, oldest first within the page
///
/// Pass the ID of the first message of the previous page as `before` to
/// walk further back. `limit` defaults to 50 and is clamped to 1..=100.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<MessagePage>> {
    let room = room_for_participant(&state, &auth, room_id).await?;

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let page = ChatMessage::list_page(&state.db, room.id, query.before, limit).await?;

    Ok(Json(page))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    crate::error::validate_request(&req)?;

    let message = post_message(&state, &auth, room_id, &req.body, req.client_id).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let room = room_for_participant(&state, &auth, room_id).await?;
    ChatParticipant::mark_read(&state.db, room.id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_validation() {
        let empty = SendMessageRequest {
            body: String::new(),
            client_id: None,
        };
        assert!(empty.validate().is_err());

        let long_client_id = SendMessageRequest {
            body: "hi".to_string(),
            client_id: Some("x".repeat(65)),
        };
        assert!(long_client_id.validate().is_err());

        let ok = SendMessageRequest {
            body: "hi".to_string(),
            client_id: Some("tmp-1".to_string()),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_queries_deserialize() {
        let query: RoomListQuery = serde_json::from_str(r#"{"kind":"group"}"#).unwrap();
        assert_eq!(query.kind, Some(ChatRoomKind::Group));

        let query: MessagesQuery = serde_json::from_str(r#"{"limit":20}"#).unwrap();
        assert_eq!(query.limit, Some(20));
        assert!(query.before.is_none());
    }
}
