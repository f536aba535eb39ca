use super::{ConnectionRegistry, DeliveryBus, DeliveryEvent};
use crate::error::AppResult;
use crate::redis_client::RedisClient;
use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use uuid::Uuid;

const CHANNEL_PREFIX: &str = "chat:user:";

fn channel_for_user(id: Uuid) -> String {
    format!("{CHANNEL_PREFIX}{id}")
}

fn user_from_channel(channel: &str) -> Option<Uuid> {
    channel
        .strip_prefix(CHANNEL_PREFIX)
        .and_then(|rest| Uuid::parse_str(rest).ok())
}

/// Publishes events through Redis so every instance can reach its own
/// connections. Pair with [`start_fanout_listener`] on each instance.
#[derive(Clone)]
pub struct RedisDeliveryBus {
    redis: RedisClient,
}

impl RedisDeliveryBus {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl DeliveryBus for RedisDeliveryBus {
    async fn publish(&self, targets: &[Uuid], event: &DeliveryEvent) -> AppResult<usize> {
        let payload = event.to_json()?;
        let mut conn = self.redis.manager();
        let mut receivers = 0;
        for user_id in targets {
            let reached: usize = conn.publish(channel_for_user(*user_id), &payload).await?;
            receivers += reached;
        }
        Ok(receivers)
    }
}

/// Forward every `chat:user:*` payload to the local registry.
///
/// Runs until the Redis connection drops.
pub async fn start_fanout_listener(
    redis: RedisClient,
    registry: ConnectionRegistry,
) -> redis::RedisResult<()> {
    // PubSub requires a dedicated connection, not multiplexed
    #[allow(deprecated)]
    let conn = redis.client().get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    pubsub.psubscribe(format!("{CHANNEL_PREFIX}*")).await?;
    tracing::info!("delivery fan-out listener subscribed");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let channel = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "dropping non-text delivery payload");
                continue;
            }
        };
        match user_from_channel(&channel) {
            Some(user_id) => {
                registry.send_to_user(user_id, &payload);
            }
            None => tracing::debug!(channel = %channel, "ignoring unrelated channel"),
        }
    }
    Ok(())
}
