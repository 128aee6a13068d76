use crate::adapters::redis::{PubSubMessage, RedisClient};
use crate::domain::realtime::{RealtimeEvent, Topic};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Carries realtime events between nodes, one Redis channel per topic.
#[derive(Debug, Clone)]
pub struct RealtimeRepository {
    redis: Arc<RedisClient>,
    channel_prefix: String,
}

impl RealtimeRepository {
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>, channel_prefix: String) -> Self {
        Self { redis, channel_prefix }
    }

    #[must_use]
    pub fn channel_name(&self, topic: Topic) -> String {
        format!("{}{topic}", self.channel_prefix)
    }

    /// # Errors
    /// Returns an error if the event cannot be encoded or the publish fails.
    pub async fn publish(&self, topic: Topic, event: &RealtimeEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.redis.publish(&self.channel_name(topic), &payload).await
    }

    /// Subscribes to every topic under this repository's prefix.
    ///
    /// # Errors
    /// Returns an error if the subscription fails.
    pub async fn subscribe_all(&self) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        self.redis.subscribe(&format!("{}*", self.channel_prefix)).await
    }

    /// Decodes a message received from [`Self::subscribe_all`].
    ///
    /// # Errors
    /// Returns an error if the channel is not a known topic or the payload is malformed.
    pub fn decode(&self, message: &PubSubMessage) -> anyhow::Result<(Topic, RealtimeEvent)> {
        decode_event(&self.channel_prefix, message)
    }
}

fn decode_event(prefix: &str, message: &PubSubMessage) -> anyhow::Result<(Topic, RealtimeEvent)> {
    let suffix = message
        .channel
        .strip_prefix(prefix)
        .ok_or_else(|| anyhow::anyhow!("channel {} outside prefix", message.channel))?;
    let topic = Topic::parse(suffix).ok_or_else(|| anyhow::anyhow!("unknown topic channel {}", message.channel))?;
    let event = serde_json::from_slice(&message.payload)?;
    Ok((topic, event))
}
