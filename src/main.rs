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

use bazaar_server::adapters::redis::RedisClient;
use bazaar_server::adapters::storage::{ObjectStorage, S3Storage, s3};
use bazaar_server::api::MgmtState;
use bazaar_server::config::Config;
use bazaar_server::{AppBuilder, Workers, adapters, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::Instrument;

/// Everything the runtime needs once booting has succeeded.
struct Booted {
    api: (TcpListener, axum::Router),
    mgmt: (TcpListener, axum::Router),
    workers: Workers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    bazaar_server::setup_panic_hook();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let booted = boot(&config, shutdown_tx.clone(), shutdown_rx.clone()).instrument(tracing::info_span!("boot_server")).await?;

    let worker_tasks = booted.workers.spawn_all(shutdown_rx.clone());
    if let Err(e) = tokio::try_join!(serve(booted.api, shutdown_rx.clone()), serve(booted.mgmt, shutdown_rx)) {
        tracing::error!(error = %e, "Server error");
    }

    // Listeners are down; give the realtime worker a bounded window to finish.
    let _ = shutdown_tx.send(true);
    let drain = futures::future::join_all(worker_tasks);
    if tokio::time::timeout(Duration::from_secs(config.server.shutdown_timeout_secs), drain).await.is_ok() {
        tracing::info!("Background tasks finished.");
    } else {
        tracing::warn!("Timeout waiting for background tasks to finish.");
    }

    telemetry_guard.shutdown();
    Ok(())
}

async fn boot(
    config: &Config,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<Booted> {
    let pool = adapters::database::init_pool(&config.database).await?;
    bazaar_server::run_migrations(&pool).await?;
    bazaar_server::spawn_signal_handler(shutdown_tx);

    let pubsub = connect_pubsub(config, shutdown_rx.clone()).await?;
    let storage: Arc<dyn ObjectStorage> =
        Arc::new(S3Storage::new(s3::build_client(&config.storage).await, &config.storage));

    let app = AppBuilder::new(config.clone())
        .with_database(pool)
        .with_pubsub(pubsub)
        .with_storage(storage)
        .with_shutdown_rx(shutdown_rx.clone())
        .build()?;

    let api_router = bazaar_server::api::app_router(config.clone(), app.services, shutdown_rx);
    let mgmt_router = bazaar_server::api::mgmt_router(MgmtState { health_service: app.health_service });

    let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;
    let api_listener = TcpListener::bind(api_addr).await?;
    let mgmt_listener = TcpListener::bind(mgmt_addr).await?;
    tracing::info!(address = %api_addr, "listening");
    tracing::info!(address = %mgmt_addr, "management server listening");

    Ok(Booted { api: (api_listener, api_router), mgmt: (mgmt_listener, mgmt_router), workers: app.workers })
}

/// Single-node mode when no PubSub URL is configured.
async fn connect_pubsub(config: &Config, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<Option<Arc<RedisClient>>> {
    let Some(url) = &config.pubsub.url else {
        return Ok(None);
    };
    let client = RedisClient::new(url, &config.pubsub, config.realtime.global_channel_capacity, shutdown_rx).await?;
    tracing::info!(prefix = %config.pubsub.channel_prefix, "Connected to PubSub");
    Ok(Some(client))
}

async fn serve((listener, router): (TcpListener, axum::Router), mut shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&s| s).await;
        })
        .await
}
