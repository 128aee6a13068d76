#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::database::DbPool;
use crate::adapters::database::conversation_repo::ConversationRepository;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::database::notification_repo::NotificationRepository;
use crate::adapters::database::profile_repo::ProfileRepository;
use crate::adapters::redis::{RealtimeRepository, RedisClient};
use crate::adapters::storage::ObjectStorage;
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::attachment_service::AttachmentService;
use crate::services::conversation_service::ConversationService;
use crate::services::health_service::HealthService;
use crate::services::notification_service::NotificationService;
use crate::services::realtime::{DistributedEventBus, EventBus, LocalEventBus, RealtimeHub};
use crate::workers::RealtimeWorker;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Runs the embedded migrations.
///
/// # Errors
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Flips the shutdown channel on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through `tracing` so they reach the configured log sinks.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(panic.location = %location, panic.payload = %payload, "Panic occurred");
    }));
}

/// Background tasks that run for the lifetime of the server.
#[derive(Debug)]
pub struct Workers {
    realtime: RealtimeWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(self.realtime.run(shutdown_rx).instrument(tracing::info_span!("realtime_worker")))]
    }
}

/// A fully wired application, ready to be served.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub event_bus: Arc<dyn EventBus>,
    pub workers: Workers,
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    pubsub: Option<Arc<RedisClient>>,
    storage: Option<Arc<dyn ObjectStorage>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, pubsub: None, storage: None, shutdown_rx: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Without a `PubSub` client the realtime bus runs in single-node mode.
    #[must_use]
    pub fn with_pubsub(mut self, pubsub: Option<Arc<RedisClient>>) -> Self {
        self.pubsub = pubsub;
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_shutdown_rx(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Wires repositories, services and workers together.
    ///
    /// # Errors
    /// Returns an error if the database, storage or shutdown channel was not provided.
    pub fn build(self) -> anyhow::Result<App> {
        let pool = self.pool.ok_or_else(|| anyhow::anyhow!("database pool is required"))?;
        let storage = self.storage.ok_or_else(|| anyhow::anyhow!("object storage is required"))?;
        let shutdown_rx = self.shutdown_rx.ok_or_else(|| anyhow::anyhow!("shutdown receiver is required"))?;

        let hub = Arc::new(RealtimeHub::new(self.config.realtime.channel_capacity));
        let realtime_repo = self
            .pubsub
            .as_ref()
            .map(|redis| RealtimeRepository::new(Arc::clone(redis), self.config.pubsub.channel_prefix.clone()));

        let event_bus: Arc<dyn EventBus> = match &realtime_repo {
            Some(repo) => Arc::new(DistributedEventBus::new(Arc::clone(&hub), repo.clone())),
            None => {
                tracing::info!("No PubSub configured, realtime events stay on this node");
                Arc::new(LocalEventBus::new(Arc::clone(&hub)))
            }
        };

        let attachment_service = AttachmentService::new(Arc::clone(&storage));
        let conversation_service = ConversationService::new(
            pool.clone(),
            ConversationRepository::new(),
            MessageRepository::new(),
            NotificationRepository::new(),
            ProfileRepository::new(),
            attachment_service,
            Arc::clone(&event_bus),
            self.config.chat.clone(),
            shutdown_rx,
        );
        let notification_service = NotificationService::new(
            pool.clone(),
            NotificationRepository::new(),
            Arc::clone(&event_bus),
            self.config.chat.notification_list_limit,
        );
        let health_service = HealthService::new(pool, storage, self.pubsub, self.config.health.clone());

        let workers = Workers {
            realtime: RealtimeWorker::new(hub, realtime_repo, self.config.realtime.gc_interval_secs),
        };

        Ok(App {
            services: ServiceContainer { conversation_service, notification_service },
            health_service,
            event_bus,
            workers,
        })
    }
}
