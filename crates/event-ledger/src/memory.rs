use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::record::validate_consumer_name;
use crate::{EventId, EventLedger, ProcessedEvent, RecordOutcome, Result};

type LedgerKey = (EventId, String);

/// In-memory event ledger for testing and single-process deployments.
///
/// The insert-if-absent check happens under one write lock, which gives the
/// same guarantee as the unique key of the PostgreSQL table.
#[derive(Clone, Default)]
pub struct InMemoryEventLedger {
    rows: Arc<RwLock<HashMap<LedgerKey, ProcessedEvent>>>,
}

impl InMemoryEventLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of rows across all consumers.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns true if the ledger holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl EventLedger for InMemoryEventLedger {
    async fn is_processed(&self, event_id: EventId, consumer: &str) -> Result<bool> {
        validate_consumer_name(consumer)?;
        let rows = self.rows.read().await;
        Ok(rows.contains_key(&(event_id, consumer.to_string())))
    }

    async fn record(&self, event_id: EventId, consumer: &str) -> Result<RecordOutcome> {
        validate_consumer_name(consumer)?;
        let mut rows = self.rows.write().await;
        let key = (event_id, consumer.to_string());

        if rows.contains_key(&key) {
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        rows.insert(key, ProcessedEvent::new(event_id, consumer));
        Ok(RecordOutcome::Recorded)
    }

    async fn get(&self, event_id: EventId, consumer: &str) -> Result<Option<ProcessedEvent>> {
        validate_consumer_name(consumer)?;
        let rows = self.rows.read().await;
        Ok(rows.get(&(event_id, consumer.to_string())).cloned())
    }

    async fn count_for_consumer(&self, consumer: &str) -> Result<u64> {
        validate_consumer_name(consumer)?;
        let rows = self.rows.read().await;
        Ok(rows.keys().filter(|(_, c)| c == consumer).count() as u64)
    }
}
