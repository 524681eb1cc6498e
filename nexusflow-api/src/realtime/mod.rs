/// Realtime chat and notifications over WebSocket
///
/// - `hub`: broadcast channels per chat room and per user
/// - `socket`: the `/api/ws` connection handler

pub mod hub;
pub mod socket;

pub use hub::ChatHub;
