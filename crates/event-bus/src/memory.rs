use std::collections::{HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{Notify, RwLock, mpsc};

use crate::{BusError, EventBus, EventHandler, IntegrationEvent, Result};

/// Default number of partitions per topic.
pub const DEFAULT_PARTITIONS: usize = 3;

/// Default number of events retained per topic for inspection and redelivery.
pub const DEFAULT_RETENTION: usize = 10_000;

struct GroupSubscription {
    group: String,
    partitions: Vec<mpsc::UnboundedSender<IntegrationEvent>>,
}

#[derive(Default)]
struct TopicState {
    log: VecDeque<IntegrationEvent>,
    groups: Vec<GroupSubscription>,
}

/// Tracks messages handed to workers but not yet handled.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn add(&self, n: usize) {
        self.count.fetch_add(n, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// In-process event bus with partitioned topics.
///
/// Each `(topic, group)` subscription gets one worker task per partition.
/// The partition is picked by hashing the envelope's `aggregate_id`, so one
/// aggregate's events are handled sequentially while different aggregates
/// proceed concurrently. The latest `retention` events of each topic are
/// kept and can be redelivered to every group; older ones are dropped.
///
/// A handler that panics is logged like a failed handler. Its worker keeps
/// running, and publishing never fails because of one group's worker.
#[derive(Clone)]
pub struct InMemoryEventBus {
    partitions: usize,
    retention: usize,
    topics: Arc<RwLock<HashMap<String, TopicState>>>,
    in_flight: Arc<InFlight>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Creates a bus with the default partition count.
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    /// Creates a bus with a specific partition count per topic.
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            retention: DEFAULT_RETENTION,
            topics: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Sets how many events are retained per topic.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    /// Returns the number of partitions per topic.
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    fn partition_for(&self, event: &IntegrationEvent) -> usize {
        let mut hasher = DefaultHasher::new();
        event.aggregate_id.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as usize
    }

    /// Returns the retained events of a topic, in publish order.
    pub async fn published(&self, topic: &str) -> Vec<IntegrationEvent> {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|state| state.log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Re-sends every retained event of a topic to every subscribed group.
    ///
    /// Returns the number of events redelivered.
    #[tracing::instrument(skip(self))]
    pub async fn redeliver(&self, topic: &str) -> Result<usize> {
        let topics = self.topics.read().await;
        let Some(state) = topics.get(topic) else {
            return Ok(0);
        };

        for event in &state.log {
            self.dispatch(topic, state, event);
        }

        tracing::info!(events = state.log.len(), "topic redelivered");
        Ok(state.log.len())
    }

    /// Waits until every dispatched message has been handled.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.in_flight.idle.notified();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Hands an event to one worker of every group.
    ///
    /// A group whose worker is gone misses the event; the others still get it.
    fn dispatch(&self, topic: &str, state: &TopicState, event: &IntegrationEvent) {
        let partition = self.partition_for(event);
        for subscription in &state.groups {
            self.in_flight.add(1);
            if subscription.partitions[partition].send(event.clone()).is_err() {
                self.in_flight.done();
                tracing::error!(
                    topic,
                    group = %subscription.group,
                    partition,
                    event_id = %event.event_id,
                    "partition worker is gone, event not delivered"
                );
                metrics::counter!("bus_undelivered_events", "topic" => topic.to_string())
                    .increment(1);
            }
        }
    }

    fn spawn_worker(
        &self,
        topic: String,
        group: String,
        partition: usize,
        handler: Arc<dyn EventHandler>,
    ) -> mpsc::UnboundedSender<IntegrationEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel::<IntegrationEvent>();
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let event_id = event.event_id;
                let event_type = event.event_type.clone();

                let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
                match outcome {
                    Ok(Ok(())) => {
                        metrics::counter!("bus_events_handled", "topic" => topic.clone())
                            .increment(1);
                    }
                    Ok(Err(e)) => {
                        tracing::error!(
                            topic = %topic,
                            group = %group,
                            partition,
                            event_id = %event_id,
                            event_type = %event_type,
                            error = %e,
                            "event handler failed"
                        );
                        metrics::counter!("bus_handler_errors", "topic" => topic.clone())
                            .increment(1);
                    }
                    Err(panic) => {
                        tracing::error!(
                            topic = %topic,
                            group = %group,
                            partition,
                            event_id = %event_id,
                            event_type = %event_type,
                            panic = panic_message(panic.as_ref()),
                            "event handler panicked"
                        );
                        metrics::counter!("bus_handler_errors", "topic" => topic.clone())
                            .increment(1);
                    }
                }

                in_flight.done();
            }
        });

        tx
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id, event_type = %event.event_type))]
    async fn publish(&self, topic: &str, event: IntegrationEvent) -> Result<()> {
        let mut topics = self.topics.write().await;
        let state = topics.entry(topic.to_string()).or_default();

        self.dispatch(topic, state, &event);
        if state.log.len() == self.retention {
            state.log.pop_front();
        }
        state.log.push_back(event);

        metrics::counter!("bus_events_published", "topic" => topic.to_string()).increment(1);
        tracing::debug!("event published");
        Ok(())
    }

    #[tracing::instrument(skip(self, handler))]
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let mut topics = self.topics.write().await;
        let state = topics.entry(topic.to_string()).or_default();

        if state.groups.iter().any(|s| s.group == group) {
            return Err(BusError::DuplicateSubscription {
                topic: topic.to_string(),
                group: group.to_string(),
            });
        }

        let partitions = (0..self.partitions)
            .map(|partition| {
                self.spawn_worker(
                    topic.to_string(),
                    group.to_string(),
                    partition,
                    Arc::clone(&handler),
                )
            })
            .collect();

        state.groups.push(GroupSubscription {
            group: group.to_string(),
            partitions,
        });

        tracing::info!(partitions = self.partitions, "consumer group subscribed");
        Ok(())
    }
}
