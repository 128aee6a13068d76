use crate::adapters::redis::{PubSubMessage, RealtimeRepository};
use crate::services::realtime::RealtimeHub;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;

/// Feeds events arriving from PubSub into the local hub and reclaims idle channels.
///
/// Without a repository (single-node mode), or once the PubSub feed is gone, only the GC
/// half runs.
#[derive(Debug)]
pub struct RealtimeWorker {
    hub: Arc<RealtimeHub>,
    repo: Option<RealtimeRepository>,
    gc_interval_secs: u64,
}

impl RealtimeWorker {
    #[must_use]
    pub const fn new(hub: Arc<RealtimeHub>, repo: Option<RealtimeRepository>, gc_interval_secs: u64) -> Self {
        Self { hub, repo, gc_interval_secs }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let pubsub_rx = match &self.repo {
            Some(repo) => tokio::select! {
                _ = shutdown.changed() => return,
                result = repo.subscribe_all() => match result {
                    Ok(rx) => Some(rx),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to subscribe to realtime events, running local GC only");
                        None
                    }
                },
            },
            None => None,
        };

        tracing::info!(distributed = pubsub_rx.is_some(), "Realtime worker started");
        self.dispatch_loop(pubsub_rx, shutdown).await;
    }

    async fn dispatch_loop(
        &self,
        mut pubsub_rx: Option<broadcast::Receiver<PubSubMessage>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut gc_interval = tokio::time::interval(Duration::from_secs(self.gc_interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                _ = gc_interval.tick() => {
                    async {
                        self.hub.perform_gc();
                    }
                    .instrument(tracing::debug_span!("realtime_gc_iteration"))
                    .await;
                }

                result = recv(pubsub_rx.as_mut()) => {
                    match result {
                        Ok(message) => {
                            let Some(repo) = &self.repo else { continue };
                            match repo.decode(&message) {
                                Ok((topic, event)) => self.hub.dispatch(topic, event),
                                Err(e) => tracing::warn!(error = %e, channel = %message.channel, "Dropping undecodable realtime event"),
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "Realtime dispatcher lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::error!("Realtime stream closed, continuing with local GC only");
                            pubsub_rx = None;
                        }
                    }
                }
            }
        }

        tracing::info!("Realtime worker shutting down...");
    }
}

async fn recv<T: Clone>(
    rx: Option<&mut broadcast::Receiver<T>>,
) -> Result<T, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::tests::conversation;
    use crate::domain::realtime::{ChangeKind, RealtimeEvent, Topic};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_local_mode_runs_gc_and_stops_on_shutdown() {
        let hub = Arc::new(RealtimeHub::new(4));
        drop(hub.subscribe(Topic::UserConversations(Uuid::new_v4())));
        assert_eq!(hub.channel_count(), 1);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(RealtimeWorker::new(Arc::clone(&hub), None, 1).run(rx));

        // The first interval tick fires immediately.
        for _ in 0..50 {
            if hub.channel_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hub.channel_count(), 0);

        let topic = Topic::UserConversations(Uuid::new_v4());
        let mut events = hub.subscribe(topic);
        hub.dispatch(
            topic,
            RealtimeEvent::ConversationChanged {
                change: ChangeKind::Created,
                conversation: conversation(Uuid::new_v4(), Uuid::new_v4()),
            },
        );
        assert!(events.try_recv().is_ok());

        tx.send(true).expect("send shutdown");
        tokio::time::timeout(Duration::from_secs(1), handle).await.expect("worker stops").expect("worker task");
    }

    #[tokio::test]
    async fn test_closed_pubsub_feed_keeps_gc_running() {
        let hub = Arc::new(RealtimeHub::new(4));
        let worker = RealtimeWorker::new(Arc::clone(&hub), None, 1);
        let (feed_tx, feed_rx) = broadcast::channel::<PubSubMessage>(4);
        drop(feed_tx);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.dispatch_loop(Some(feed_rx), rx).await });

        // Let the worker observe the closed feed and run its first GC pass.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished(), "worker must outlive its PubSub feed");

        drop(hub.subscribe(Topic::Notifications(Uuid::new_v4())));
        assert_eq!(hub.channel_count(), 1);
        for _ in 0..30 {
            if hub.channel_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(hub.channel_count(), 0, "GC keeps reclaiming after the feed closed");

        tx.send(true).expect("send shutdown");
        tokio::time::timeout(Duration::from_secs(1), handle).await.expect("worker stops").expect("worker task");
    }
}
