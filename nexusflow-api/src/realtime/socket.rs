/// WebSocket endpoint: `GET /api/ws?token=<access token>`
///
/// Browsers cannot set headers on a WebSocket handshake, so the access token
/// may be passed as a query parameter; a bearer header works too.
///
/// Each connection owns its subscriptions. A room is joined with
/// `join-chat-room` (participants only) and the personal channel with
/// `join-room`. Typing indicators and messages go to the room's channel;
/// the typist never gets their own `user-typing` back.

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use crate::realtime::hub::HubEvent;
use crate::routes::chat::post_message;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use nexusflow_shared::auth::authorization::require_active_member;
use nexusflow_shared::auth::middleware::{authenticate, AuthContext};
use nexusflow_shared::events::{
    decode_client_event, encode_server_event, Channel, ClientEvent, JoinScope, ServerEvent,
    MAX_FRAME_BYTES,
};
use nexusflow_shared::models::chat::ChatParticipant;
use serde::Deserialize;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamMap;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let auth = authenticate(&headers, query.token.as_deref(), state.jwt_secret())?;
    let user = require_active_member(&state.db, &auth).await?;

    tracing::debug!(user_id = %auth.user_id, "WebSocket upgrade");

    Ok(ws
        .max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| Connection::new(state, auth, user.name).run(socket)))
}

struct Connection {
    state: AppState,
    auth: AuthContext,
    name: String,
    subscriptions: StreamMap<Channel, BroadcastStream<HubEvent>>,
}

impl Connection {
    fn new(state: AppState, auth: AuthContext, name: String) -> Self {
        Self {
            state,
            auth,
            name,
            subscriptions: StreamMap::new(),
        }
    }

    async fn run(mut self, socket: WebSocket) {
        let (mut sender, mut receiver) = socket.split();

        loop {
            let outgoing = tokio::select! {
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text).await,
                    Some(Ok(Message::Binary(_))) => Some(ServerEvent::error("Binary frames are not supported")),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        tracing::debug!(user_id = %self.auth.user_id, error = %e, "WebSocket receive failed");
                        break;
                    }
                },
                Some((channel, item)) = self.subscriptions.next(), if !self.subscriptions.is_empty() => {
                    match item {
                        Ok(event) if event.originates_from(self.auth.user_id) => None,
                        Ok(event) => Some((*event).clone()),
                        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                            tracing::debug!(channel = %channel, skipped, "Subscriber lagged");
                            None
                        }
                    }
                }
            };

            let Some(event) = outgoing else { continue };

            let frame = match encode_server_event(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(event = event.name(), error = %e, "Failed to encode event");
                    continue;
                }
            };

            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }

        self.close();
        let _ = sender.close().await;
    }

    /// Handles one client frame and returns the direct reply, if any
    async fn handle_frame(&mut self, frame: &str) -> Option<ServerEvent> {
        let event = match decode_client_event(frame) {
            Ok(event) => event,
            Err(e) => return Some(ServerEvent::error(e.to_string())),
        };

        match self.dispatch(event).await {
            Ok(reply) => reply,
            Err(e) => Some(ServerEvent::error(e.to_string())),
        }
    }

    async fn dispatch(&mut self, event: ClientEvent) -> ApiResult<Option<ServerEvent>> {
        match event {
            ClientEvent::JoinRoom => {
                let user_id = self.auth.user_id;
                self.subscribe(Channel::User(user_id));
                Ok(Some(ServerEvent::Joined(JoinScope::User { user_id })))
            }

            ClientEvent::JoinChatRoom { room_id } => {
                require_active_member(&self.state.db, &self.auth).await?;
                if !ChatParticipant::is_participant(&self.state.db, room_id, self.auth.user_id).await? {
                    return Err(ApiError::Forbidden("Not a participant of this room".to_string()));
                }
                self.subscribe(Channel::Room(room_id));
                Ok(Some(ServerEvent::Joined(JoinScope::Room { room_id })))
            }

            ClientEvent::LeaveChatRoom { room_id } => {
                self.unsubscribe(Channel::Room(room_id));
                Ok(Some(ServerEvent::Left(JoinScope::Room { room_id })))
            }

            ClientEvent::Typing { room_id, is_typing } => {
                self.require_joined(room_id)?;
                self.state.hub.publish(
                    Channel::Room(room_id),
                    ServerEvent::UserTyping {
                        room_id,
                        user_id: self.auth.user_id,
                        name: self.name.clone(),
                        is_typing,
                    },
                );
                Ok(None)
            }

            ClientEvent::NewMessage {
                room_id,
                body,
                client_id,
            } => {
                let message = post_message(&self.state, &self.auth, room_id, &body, client_id.clone()).await?;

                // joined sockets already get it from the room broadcast
                if self.subscriptions.contains_key(&Channel::Room(room_id)) {
                    Ok(None)
                } else {
                    Ok(Some(ServerEvent::NewMessage { message, client_id }))
                }
            }

            ClientEvent::Ping => Ok(Some(ServerEvent::Pong)),
        }
    }

    fn require_joined(&self, room_id: Uuid) -> ApiResult<()> {
        if self.subscriptions.contains_key(&Channel::Room(room_id)) {
            Ok(())
        } else {
            Err(ApiError::BadRequest("Join the room first".to_string()))
        }
    }

    fn subscribe(&mut self, channel: Channel) {
        if !self.subscriptions.contains_key(&channel) {
            let receiver = self.state.hub.subscribe(channel);
            self.subscriptions.insert(channel, BroadcastStream::new(receiver));
        }
    }

    fn unsubscribe(&mut self, channel: Channel) {
        if self.subscriptions.remove(&channel).is_some() {
            self.state.hub.release(channel);
        }
    }

    fn close(&mut self) {
        let channels: Vec<Channel> = self.subscriptions.keys().copied().collect();
        for channel in channels {
            self.unsubscribe(channel);
        }
        tracing::debug!(user_id = %self.auth.user_id, "WebSocket closed");
    }
}
