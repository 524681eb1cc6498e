/// In-process fan-out of socket events
///
/// One `tokio::sync::broadcast` channel per [`Channel`] (a chat room or a
/// user's personal channel), created on first subscribe. Delivery is
/// at-most-once: a subscriber that falls more than `capacity` events behind
/// skips what it missed, and nothing is replayed on reconnect.
///
/// Subscribers call [`ChatHub::release`] after dropping their receiver so
/// channels nobody listens to are removed.

use nexusflow_shared::events::{Channel, ServerEvent};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

pub type HubEvent = Arc<ServerEvent>;

/// Per-channel buffer size
pub const DEFAULT_CAPACITY: usize = 256;

pub struct ChatHub {
    channels: RwLock<HashMap<Channel, broadcast::Sender<HubEvent>>>,
    capacity: usize,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChatHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, channel: Channel) -> broadcast::Receiver<HubEvent> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(channel)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Sends `event` to everyone subscribed to `channel` and returns how many
    /// receivers it reached. Publishing to a channel with no subscribers is a
    /// no-op.
    pub fn publish(&self, channel: Channel, event: ServerEvent) -> usize {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = channels.get(&channel) else {
            return 0;
        };

        match sender.send(Arc::new(event)) {
            Ok(reached) => reached,
            Err(_) => 0,
        }
    }

    /// Removes `channel` if its last receiver is gone
    pub fn release(&self, channel: Channel) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        if channels
            .get(&channel)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(&channel);
            tracing::trace!(channel = %channel, "Pruned idle channel");
        }
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels.get(&channel).map_or(0, |s| s.receiver_count())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
