/// Realtime events
///
/// - [`protocol`]: the JSON events exchanged over the chat socket
/// - [`serialization`]: frame parsing/encoding and hub channel keys
///
/// # Example
///
/// ```
/// use nexusflow_shared::events::{decode_client_event, ClientEvent};
///
/// let event = decode_client_event(r#"{"event":"ping"}"#).unwrap();
/// assert_eq!(event, ClientEvent::Ping);
/// ```

pub mod protocol;
pub mod serialization;

pub use protocol::{ClientEvent, JoinScope, ServerEvent};
pub use serialization::{
    decode_client_event, encode_server_event, normalize_body, Channel, SerializationError,
    MAX_FRAME_BYTES,
};
