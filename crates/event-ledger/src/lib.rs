//! Event ledger for idempotent event consumption.
//!
//! The ledger records which event ids have already produced an effect for a
//! given consumer. [`IdempotentProcessor`] wraps a ledger and runs an effect at
//! most once per `(event_id, consumer)` pair.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod processor;
pub mod record;

pub use common::EventId;
pub use error::{ConsumeError, LedgerError, Result};
pub use ledger::EventLedger;
pub use memory::InMemoryEventLedger;
pub use postgres::PostgresEventLedger;
pub use processor::{IdempotentProcessor, ProcessOutcome};
pub use record::{ProcessedEvent, RecordOutcome};
