use crate::config::PubSubConfig;
use backon::{ExponentialBuilder, Retryable};
use futures::StreamExt;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::Instrument;

pub mod realtime_repo;

pub use realtime_repo::RealtimeRepository;

#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Redis connection used for publishing plus pattern-subscription listeners.
#[derive(Debug)]
pub struct RedisClient {
    publisher: redis::aio::ConnectionManager,
    client: redis::Client,
    shutdown: watch::Receiver<bool>,
    channel_capacity: usize,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl RedisClient {
    /// Connects the publishing connection.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn new(
        url: &str,
        config: &PubSubConfig,
        channel_capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_connection_manager().await?;

        Ok(Arc::new(Self {
            publisher,
            client,
            shutdown,
            channel_capacity,
            min_backoff: Duration::from_secs(config.min_backoff_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
        }))
    }

    /// # Errors
    /// Returns an error if the Redis command fails.
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> anyhow::Result<()> {
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, i64>(channel, payload).await?;
        Ok(())
    }

    /// Starts a background listener for `pattern` and returns its feed.
    ///
    /// Resolves once the first subscription is confirmed. The listener reconnects with
    /// exponential backoff, without an attempt limit, until shutdown; messages published
    /// while disconnected are lost.
    ///
    /// # Errors
    /// Returns an error if shutdown begins before the first subscription succeeds.
    pub async fn subscribe(&self, pattern: &str) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        let (tx, rx) = broadcast::channel(self.channel_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();

        let listener = PatternListener {
            client: self.client.clone(),
            pattern: pattern.to_string(),
            tx,
            shutdown: self.shutdown.clone(),
            retry: ExponentialBuilder::default()
                .with_min_delay(self.min_backoff)
                .with_max_delay(self.max_backoff)
                .without_max_times(),
        };

        tokio::spawn(listener.run(ready_tx).instrument(tracing::debug_span!("pubsub_listener", pattern = %pattern)));

        ready_rx.await.map_err(|_| anyhow::anyhow!("pubsub listener for {pattern} exited before subscribing"))?;
        Ok(rx)
    }

    /// Pings the Redis server to check connectivity.
    ///
    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.publisher.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

struct PatternListener {
    client: redis::Client,
    pattern: String,
    tx: broadcast::Sender<PubSubMessage>,
    shutdown: watch::Receiver<bool>,
    retry: ExponentialBuilder,
}

impl PatternListener {
    async fn connect(&self) -> Result<redis::aio::PubSub, redis::RedisError> {
        (|| async {
            let mut pubsub = self.client.get_async_pubsub().await?;
            pubsub.psubscribe(&self.pattern).await?;
            Ok::<_, redis::RedisError>(pubsub)
        })
        .retry(self.retry)
        .notify(|e, delay| {
            tracing::warn!(error = %e, ?delay, "Pubsub subscription failed, retrying");
        })
        .await
    }

    async fn run(self, ready_tx: oneshot::Sender<()>) {
        let mut ready_tx = Some(ready_tx);
        let mut shutdown = self.shutdown.clone();

        loop {
            let pubsub = tokio::select! {
                _ = shutdown.changed() => return,
                result = self.connect() => match result {
                    Ok(pubsub) => pubsub,
                    Err(e) => {
                        tracing::error!(error = %e, "Pubsub subscription failed, starting over");
                        continue;
                    }
                },
            };

            tracing::info!(pattern = %self.pattern, "Subscribed to pubsub");
            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(());
            }

            let mut messages = pubsub.into_on_message();
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    msg = messages.next() => {
                        let Some(msg) = msg else {
                            tracing::warn!(pattern = %self.pattern, "Pubsub connection lost, reconnecting");
                            break;
                        };
                        let message = PubSubMessage {
                            channel: msg.get_channel_name().to_string(),
                            payload: msg.get_payload().unwrap_or_default(),
                        };
                        // No receivers only means the dispatcher is not running yet.
                        let _ = self.tx.send(message);
                    }
                }
            }

            if *shutdown.borrow() {
                return;
            }
        }
    }
}
