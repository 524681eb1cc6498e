/// Frame encoding and channel naming for the chat socket
///
/// Text frames carry one JSON event each. Incoming frames are size-checked
/// before parsing and message bodies are trimmed and bounded, so handlers
/// only ever see well-formed events.
///
/// Hub channels are keyed by [`Channel`]:
/// - `room:{room_id}`: everyone currently viewing a chat room
/// - `user:{user_id}`: one user's personal channel (task notifications)

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use super::protocol::{ClientEvent, ServerEvent};

/// Largest text frame accepted from a client
pub const MAX_FRAME_BYTES: usize = 16 * 1024;

/// Longest chat message body, in characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Message body is empty")]
    EmptyMessage,

    #[error("Message body exceeds 4000 characters")]
    MessageTooLong,

    #[error("Malformed event: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Broadcast channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Room(Uuid),
    User(Uuid),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Room(id) => write!(f, "room:{}", id),
            Channel::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Trims a chat body and enforces the length bounds
pub fn normalize_body(body: &str) -> Result<String, SerializationError> {
    let body = body.trim();

    if body.is_empty() {
        return Err(SerializationError::EmptyMessage);
    }
    if body.chars().count() > MAX_MESSAGE_CHARS {
        return Err(SerializationError::MessageTooLong);
    }

    Ok(body.to_string())
}

/// Parses a client text frame
pub fn decode_client_event(frame: &str) -> Result<ClientEvent, SerializationError> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(SerializationError::FrameTooLarge(frame.len()));
    }

    let event: ClientEvent = serde_json::from_str(frame)?;

    match event {
        ClientEvent::NewMessage {
            room_id,
            body,
            client_id,
        } => Ok(ClientEvent::NewMessage {
            room_id,
            body: normalize_body(&body)?,
            client_id,
        }),
        other => Ok(other),
    }
}

pub fn encode_server_event(event: &ServerEvent) -> Result<String, SerializationError> {
    Ok(serde_json::to_string(event)?)
}
