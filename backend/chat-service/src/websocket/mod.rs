use crate::error::AppResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

pub mod bus;
pub mod events;
pub mod pubsub;

pub use bus::DeliveryBus;
pub use events::DeliveryEvent;
pub use pubsub::{start_fanout_listener, RedisDeliveryBus};

/// Unique identifier for a WebSocket subscriber
///
/// Each WebSocket connection gets a unique subscriber ID when it registers.
/// This allows for precise cleanup when connections close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<String>,
}

/// Live WebSocket connections of this instance, keyed by user.
///
/// A user may hold several connections (tabs, devices); every one of them
/// receives each event addressed to that user. Locking is per user entry.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // user_id -> live subscribers
    inner: Arc<DashMap<Uuid, Vec<Subscriber>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `user_id`.
    ///
    /// Returns the id to pass to [`ConnectionRegistry::unsubscribe`] and the
    /// channel the connection reads serialized events from.
    pub fn subscribe(&self, user_id: Uuid) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let subscriber_id = SubscriberId::new();

        let mut entry = self.inner.entry(user_id).or_default();
        entry.push(Subscriber {
            id: subscriber_id,
            sender: tx,
        });

        tracing::debug!(
            user_id = %user_id,
            subscriber = ?subscriber_id,
            total = entry.len(),
            "subscriber added"
        );

        (subscriber_id, rx)
    }

    /// Must be called when a WebSocket connection closes.
    pub fn unsubscribe(&self, user_id: Uuid, subscriber_id: SubscriberId) {
        let removed_all = match self.inner.get_mut(&user_id) {
            Some(mut subscribers) => {
                subscribers.retain(|s| s.id != subscriber_id);
                subscribers.is_empty()
            }
            None => return,
        };

        if removed_all {
            // Only drop the entry if no subscriber raced in meanwhile
            self.inner.remove_if(&user_id, |_, subscribers| subscribers.is_empty());
        }
        tracing::debug!(user_id = %user_id, subscriber = ?subscriber_id, "subscriber removed");
    }

    /// Push a payload to every live connection of `user_id`.
    ///
    /// Dead senders are pruned. Returns how many connections accepted it.
    pub fn send_to_user(&self, user_id: Uuid, payload: &str) -> usize {
        let Some(mut subscribers) = self.inner.get_mut(&user_id) else {
            return 0;
        };

        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.sender.send(payload.to_string()).is_ok());
        let after = subscribers.len();
        if before != after {
            tracing::debug!(
                user_id = %user_id,
                pruned = before - after,
                active = after,
                "dead senders cleaned up"
            );
        }
        let empty = subscribers.is_empty();
        drop(subscribers);

        if empty {
            self.inner.remove_if(&user_id, |_, subscribers| subscribers.is_empty());
        }
        after
    }

    pub fn subscriber_count(&self, user_id: Uuid) -> usize {
        self.inner.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }

    pub fn connected_users(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl DeliveryBus for ConnectionRegistry {
    async fn publish(&self, targets: &[Uuid], event: &DeliveryEvent) -> AppResult<usize> {
        let payload = event.to_json()?;
        Ok(targets
            .iter()
            .map(|user_id| self.send_to_user(*user_id, &payload))
            .sum())
    }
}
