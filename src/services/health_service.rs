use crate::adapters::database::DbPool;
use crate::adapters::redis::RedisClient;
use crate::adapters::storage::ObjectStorage;
use crate::config::HealthConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            status: meter
                .i64_gauge("bazaar_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    pool: DbPool,
    storage: Arc<dyn ObjectStorage>,
    pubsub: Option<Arc<RedisClient>>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    /// `pubsub` is `None` in single-node mode; the check then always passes.
    #[must_use]
    pub fn new(
        pool: DbPool,
        storage: Arc<dyn ObjectStorage>,
        pubsub: Option<Arc<RedisClient>>,
        config: HealthConfig,
    ) -> Self {
        Self { pool, storage, pubsub, config, metrics: Metrics::new() }
    }

    fn record(&self, component: &'static str, ok: bool) {
        self.metrics.status.record(i64::from(ok), &[KeyValue::new("component", component)]);
    }

    /// Checks database connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the database is unreachable.
    pub async fn check_db(&self) -> Result<(), String> {
        let db_timeout = Duration::from_millis(self.config.db_timeout_ms);

        let result = match timeout(db_timeout, sqlx::query("SELECT 1").execute(&self.pool)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("Database connection failed: {e:?}")),
            Err(_) => Err("Database connection timed out".to_string()),
        };
        self.record("database", result.is_ok());
        result
    }

    /// Checks object store connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the bucket is unreachable.
    pub async fn check_storage(&self) -> Result<(), String> {
        let storage_timeout = Duration::from_millis(self.config.storage_timeout_ms);

        let result = match timeout(storage_timeout, self.storage.check()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("Storage check failed: {e}")),
            Err(_) => Err("Storage connection timed out".to_string()),
        };
        self.record("storage", result.is_ok());
        result
    }

    /// Checks `PubSub` connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if `PubSub` is unreachable.
    pub async fn check_pubsub(&self) -> Result<(), String> {
        let Some(pubsub) = &self.pubsub else {
            return Ok(());
        };
        let pubsub_timeout = Duration::from_millis(self.config.pubsub_timeout_ms);

        let result = match timeout(pubsub_timeout, pubsub.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("PubSub connection failed: {e:?}")),
            Err(_) => Err("PubSub connection timed out".to_string()),
        };
        self.record("pubsub", result.is_ok());
        result
    }
}
