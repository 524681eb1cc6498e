/// Chat socket protocol
///
/// Every frame is a JSON object `{"event": "<name>", "data": {...}}`.
/// Events without a payload (`join-room`, `ping`) may omit `data`.
///
/// Client to server:
///
/// | event             | data                              |
/// |-------------------|-----------------------------------|
/// | `join-room`       |                                   |
/// | `join-chat-room`  | `{room_id}`                       |
/// | `leave-chat-room` | `{room_id}`                       |
/// | `typing`          | `{room_id, is_typing}`            |
/// | `new-message`     | `{room_id, body, client_id?}`     |
/// | `ping`            |                                   |
///
/// Server to client: `joined`, `left`, `new-message`, `user-typing`,
/// `task-updated`, `error`, `pong`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::chat::ChatMessage;
use crate::models::task::TaskStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Subscribe to the caller's personal channel (task notifications)
    JoinRoom,

    JoinChatRoom {
        room_id: Uuid,
    },

    LeaveChatRoom {
        room_id: Uuid,
    },

    Typing {
        room_id: Uuid,
        is_typing: bool,
    },

    NewMessage {
        room_id: Uuid,
        body: String,

        /// Opaque client token echoed back so the sender can match its
        /// optimistic message
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    Ping,
}

/// Which channel a `joined`/`left` acknowledgement refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum JoinScope {
    User { user_id: Uuid },
    Room { room_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Joined(JoinScope),

    Left(JoinScope),

    NewMessage {
        message: ChatMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    UserTyping {
        room_id: Uuid,
        user_id: Uuid,
        name: String,
        is_typing: bool,
    },

    TaskUpdated {
        task_id: Uuid,
        title: String,
        status: TaskStatus,
        actor_id: Uuid,
    },

    Error {
        message: String,
    },

    Pong,
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Name on the wire, for logging
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Joined(_) => "joined",
            ServerEvent::Left(_) => "left",
            ServerEvent::NewMessage { .. } => "new-message",
            ServerEvent::UserTyping { .. } => "user-typing",
            ServerEvent::TaskUpdated { .. } => "task-updated",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Pong => "pong",
        }
    }

    /// Typing indicators are not sent back to the user who is typing
    pub fn originates_from(&self, user_id: Uuid) -> bool {
        matches!(self, ServerEvent::UserTyping { user_id: typist, .. } if *typist == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_client_event_wire_names() {
        let room_id = Uuid::new_v4();

        let join: ClientEvent = serde_json::from_value(json!({"event": "join-room"})).unwrap();
        assert_eq!(join, ClientEvent::JoinRoom);

        let typing: ClientEvent = serde_json::from_value(json!({
            "event": "typing",
            "data": {"room_id": room_id, "is_typing": true}
        }))
        .unwrap();
        assert_eq!(typing, ClientEvent::Typing { room_id, is_typing: true });

        let msg: ClientEvent = serde_json::from_value(json!({
            "event": "new-message",
            "data": {"room_id": room_id, "body": "hi"}
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientEvent::NewMessage { room_id, body: "hi".to_string(), client_id: None }
        );
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(serde_json::from_value::<ClientEvent>(json!({"event": "shutdown"})).is_err());
    }

    #[test]
    fn test_server_event_shape() {
        let room_id = Uuid::new_v4();
        let value = serde_json::to_value(ServerEvent::Joined(JoinScope::Room { room_id })).unwrap();

        assert_eq!(value["event"], "joined");
        assert_eq!(value["data"]["scope"], "room");
        assert_eq!(value["data"]["room_id"], json!(room_id));

        let pong = serde_json::to_value(ServerEvent::Pong).unwrap();
        assert_eq!(pong, json!({"event": "pong"}));
    }

    #[test]
    fn test_new_message_omits_missing_client_id() {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            sender_id: Some(Uuid::new_v4()),
            sender_name: Some("Jane".to_string()),
            body: "hello".to_string(),
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(ServerEvent::NewMessage { message, client_id: None }).unwrap();
        assert_eq!(value["event"], "new-message");
        assert!(value["data"].get("client_id").is_none());
        assert_eq!(value["data"]["message"]["body"], "hello");
    }

    #[test]
    fn test_task_updated_status_is_snake_case() {
        let value = serde_json::to_value(ServerEvent::TaskUpdated {
            task_id: Uuid::new_v4(),
            title: "Ship it".to_string(),
            status: TaskStatus::UnderReview,
            actor_id: Uuid::new_v4(),
        })
        .unwrap();

        assert_eq!(value["event"], "task-updated");
        assert_eq!(value["data"]["status"], "under_review");
    }

    #[test]
    fn test_originates_from() {
        let typist = Uuid::new_v4();
        let event = ServerEvent::UserTyping {
            room_id: Uuid::new_v4(),
            user_id: typist,
            name: "Jane".to_string(),
            is_typing: true,
        };

        assert!(event.originates_from(typist));
        assert!(!event.originates_from(Uuid::new_v4()));
        assert!(!ServerEvent::Pong.originates_from(typist));
    }
}
