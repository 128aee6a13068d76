use crate::adapters::redis::RealtimeRepository;
use crate::domain::realtime::{RealtimeEvent, Topic};
use async_trait::async_trait;
use dashmap::DashMap;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, UpDownCounter},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Clone, Debug)]
struct Metrics {
    published_total: Counter<u64>,
    delivered_total: Counter<u64>,
    unrouted_total: Counter<u64>,
    active_channels: UpDownCounter<i64>,
    gc_reclaimed_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            published_total: meter
                .u64_counter("bazaar_realtime_published_total")
                .with_description("Realtime events handed to the bus")
                .build(),
            delivered_total: meter
                .u64_counter("bazaar_realtime_delivered_total")
                .with_description("Realtime events delivered to a local channel")
                .build(),
            unrouted_total: meter
                .u64_counter("bazaar_realtime_unrouted_total")
                .with_description("Realtime events with no local subscriber")
                .build(),
            active_channels: meter
                .i64_up_down_counter("bazaar_realtime_channels")
                .with_description("Number of active local realtime channels")
                .build(),
            gc_reclaimed_total: meter
                .u64_counter("bazaar_realtime_channels_reclaimed_total")
                .with_description("Local channels reclaimed because nobody listened")
                .build(),
        }
    }
}

const fn topic_label(topic: Topic) -> &'static str {
    match topic {
        Topic::Conversation(_) => "conversation",
        Topic::UserConversations(_) => "user_conversations",
        Topic::Notifications(_) => "notifications",
    }
}

/// Node-local fan-out: one broadcast channel per topic that currently has subscribers.
#[derive(Debug)]
pub struct RealtimeHub {
    channels: DashMap<Topic, broadcast::Sender<RealtimeEvent>>,
    capacity: usize,
    metrics: Metrics,
}

impl RealtimeHub {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { channels: DashMap::new(), capacity: capacity.max(1), metrics: Metrics::new() }
    }

    #[must_use]
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<RealtimeEvent> {
        self.channels
            .entry(topic)
            .or_insert_with(|| {
                self.metrics.active_channels.add(1, &[]);
                broadcast::channel(self.capacity).0
            })
            .value()
            .subscribe()
    }

    /// Delivers an event to this node's subscribers of `topic`.
    pub fn dispatch(&self, topic: Topic, event: RealtimeEvent) {
        let label = KeyValue::new("topic", topic_label(topic));
        match self.channels.get(&topic) {
            Some(tx) => {
                tracing::trace!(%topic, "Dispatched realtime event");
                let _ = tx.send(event);
                self.metrics.delivered_total.add(1, &[label]);
            }
            None => {
                tracing::trace!(%topic, "No local subscriber for realtime event");
                self.metrics.unrouted_total.add(1, &[label]);
            }
        }
    }

    /// Drops channels whose receivers are all gone. Returns how many were reclaimed.
    pub fn perform_gc(&self) -> usize {
        let mut reclaimed = 0;
        self.channels.retain(|_, tx| {
            let active = tx.receiver_count() > 0;
            if !active {
                reclaimed += 1;
            }
            active
        });

        if reclaimed > 0 {
            let count = reclaimed as u64;
            self.metrics.active_channels.add(-i64::try_from(count).unwrap_or(i64::MAX), &[]);
            self.metrics.gc_reclaimed_total.add(count, &[]);
            tracing::debug!(reclaimed, "Realtime GC reclaimed stale channels");
        }
        reclaimed
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Publishes realtime events and hands out subscriptions.
#[async_trait]
pub trait EventBus: Send + Sync + std::fmt::Debug {
    /// Publishes an event. Failures are logged; publishing never fails the caller.
    async fn publish(&self, topic: Topic, event: RealtimeEvent);

    fn subscribe(&self, topic: Topic) -> broadcast::Receiver<RealtimeEvent>;
}

/// Single-node bus: events go straight to the local hub.
#[derive(Debug, Clone)]
pub struct LocalEventBus {
    hub: Arc<RealtimeHub>,
}

impl LocalEventBus {
    #[must_use]
    pub const fn new(hub: Arc<RealtimeHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish(&self, topic: Topic, event: RealtimeEvent) {
        self.hub.metrics.published_total.add(1, &[KeyValue::new("status", "local")]);
        self.hub.dispatch(topic, event);
    }

    fn subscribe(&self, topic: Topic) -> broadcast::Receiver<RealtimeEvent> {
        self.hub.subscribe(topic)
    }
}

/// Multi-node bus: events travel through Redis and come back to every node's hub
/// via the realtime worker.
#[derive(Debug, Clone)]
pub struct DistributedEventBus {
    hub: Arc<RealtimeHub>,
    repo: RealtimeRepository,
}

impl DistributedEventBus {
    #[must_use]
    pub const fn new(hub: Arc<RealtimeHub>, repo: RealtimeRepository) -> Self {
        Self { hub, repo }
    }
}

#[async_trait]
impl EventBus for DistributedEventBus {
    #[tracing::instrument(skip(self, event), fields(topic = %topic))]
    async fn publish(&self, topic: Topic, event: RealtimeEvent) {
        if let Err(e) = self.repo.publish(topic, &event).await {
            // Same-node subscribers can still be served.
            tracing::error!(error = %e, "Failed to publish realtime event to PubSub");
            self.hub.metrics.published_total.add(1, &[KeyValue::new("status", "error")]);
            self.hub.dispatch(topic, event);
        } else {
            self.hub.metrics.published_total.add(1, &[KeyValue::new("status", "sent")]);
        }
    }

    fn subscribe(&self, topic: Topic) -> broadcast::Receiver<RealtimeEvent> {
        self.hub.subscribe(topic)
    }
}

/// Publishes the same event on several topics, in order.
pub async fn publish_all(bus: &dyn EventBus, topics: &[Topic], event: &RealtimeEvent) {
    for topic in topics {
        bus.publish(*topic, event.clone()).await;
    }
}

/// Adapts a subscription into a `Stream`; lag surfaces as an error item.
#[must_use]
pub fn event_stream(rx: broadcast::Receiver<RealtimeEvent>) -> BroadcastStream<RealtimeEvent> {
    BroadcastStream::new(rx)
}
