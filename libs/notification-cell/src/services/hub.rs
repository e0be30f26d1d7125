use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::{NotificationError, SocketEvent};

pub type SocketSender = broadcast::Sender<String>;
pub type SocketReceiver = broadcast::Receiver<String>;

const CHANNEL_CAPACITY: usize = 64;

/// Registry of live per-user channels. Every open socket of a user subscribes to the
/// same broadcast sender, so one emit reaches all of that user's devices.
#[derive(Clone, Default)]
pub struct NotificationHub {
    channels: Arc<RwLock<HashMap<String, SocketSender>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, user_id: &str) -> SocketReceiver {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);

        debug!("User {} connected ({} sockets)", user_id, sender.receiver_count() + 1);
        sender.subscribe()
    }

    /// Drops the user's channel once its last receiver is gone.
    pub async fn disconnect(&self, user_id: &str) {
        let mut channels = self.channels.write().await;
        if let Some(sender) = channels.get(user_id) {
            if sender.receiver_count() == 0 {
                channels.remove(user_id);
                debug!("Removed socket channel for user {}", user_id);
            }
        }
    }

    /// Returns `true` when at least one socket of the user received the event.
    pub async fn emit(&self, user_id: &str, event: &SocketEvent) -> Result<bool, NotificationError> {
        let frame = serde_json::to_string(event)?;

        let channels = self.channels.read().await;
        let delivered = match channels.get(user_id) {
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        };

        debug!("Socket event for user {} delivered: {}", user_id, delivered);
        Ok(delivered)
    }

    pub async fn is_connected(&self, user_id: &str) -> bool {
        let channels = self.channels.read().await;
        channels
            .get(user_id)
            .map(|sender| sender.receiver_count() > 0)
            .unwrap_or(false)
    }

    pub async fn connected_users(&self) -> Vec<String> {
        let channels = self.channels.read().await;
        channels
            .iter()
            .filter(|(_, sender)| sender.receiver_count() > 0)
            .map(|(user_id, _)| user_id.clone())
            .collect()
    }
}
