use async_trait::async_trait;

use crate::{EventId, ProcessedEvent, RecordOutcome, Result};

/// Storage for processed-event rows keyed by `(event_id, consumer_name)`.
///
/// Topics consumed by a single group still pass a fixed consumer name, so one
/// key shape serves both single- and multi-consumer topics.
///
/// Implementations must make [`record`](EventLedger::record) an atomic
/// insert-if-absent: two concurrent calls for the same key must not both
/// return [`RecordOutcome::Recorded`].
#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Returns true if a row exists for the given key.
    async fn is_processed(&self, event_id: EventId, consumer: &str) -> Result<bool>;

    /// Inserts a row for the given key unless one already exists.
    async fn record(&self, event_id: EventId, consumer: &str) -> Result<RecordOutcome>;

    /// Retrieves the row for the given key.
    async fn get(&self, event_id: EventId, consumer: &str) -> Result<Option<ProcessedEvent>>;

    /// Returns the number of rows recorded for a consumer.
    async fn count_for_consumer(&self, consumer: &str) -> Result<u64>;
}
