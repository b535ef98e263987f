use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventId, LedgerError, Result};

/// Maximum length of a consumer name, matching the `consumer_name` column.
pub const MAX_CONSUMER_NAME_LEN: usize = 100;

/// A ledger row: the effect of `event_id` has been applied by `consumer_name`.
///
/// Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    pub event_id: EventId,
    pub consumer_name: String,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    /// Creates a row stamped with the current time.
    pub fn new(event_id: EventId, consumer_name: impl Into<String>) -> Self {
        Self {
            event_id,
            consumer_name: consumer_name.into(),
            processed_at: Utc::now(),
        }
    }
}

/// Outcome of inserting a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The row was inserted by this call.
    Recorded,
    /// A row for the same key already existed; nothing was written.
    AlreadyRecorded,
}

impl RecordOutcome {
    /// Returns true if this call inserted the row.
    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded)
    }
}

/// Checks that a consumer name can be used as part of the ledger key.
pub(crate) fn validate_consumer_name(consumer: &str) -> Result<()> {
    if consumer.trim().is_empty() || consumer.len() > MAX_CONSUMER_NAME_LEN {
        return Err(LedgerError::InvalidConsumer(consumer.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_name_must_be_non_empty() {
        assert!(validate_consumer_name("order-confirmed-consumer").is_ok());
        assert!(validate_consumer_name("").is_err());
        assert!(validate_consumer_name("   ").is_err());
    }

    #[test]
    fn consumer_name_length_is_bounded() {
        let long = "c".repeat(MAX_CONSUMER_NAME_LEN + 1);
        assert!(matches!(
            validate_consumer_name(&long),
            Err(LedgerError::InvalidConsumer(_))
        ));
    }

    #[test]
    fn processed_event_uses_camel_case_fields() {
        let row = ProcessedEvent::new(EventId::new(), "analytics");
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("eventId").is_some());
        assert!(json.get("consumerName").is_some());
        assert!(json.get("processedAt").is_some());
    }
}
