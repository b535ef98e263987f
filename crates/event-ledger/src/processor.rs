//! Idempotent effect application on top of an [`EventLedger`].

use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{ConsumeError, EventId, EventLedger, RecordOutcome};

/// Number of lock shards used to serialize work on the same ledger key.
const DEFAULT_SHARDS: usize = 64;

/// What happened to a delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The effect ran and the ledger row was written.
    Applied,
    /// The event had already been processed by this consumer; nothing ran.
    Skipped,
}

impl ProcessOutcome {
    /// Returns true if the effect ran during this call.
    pub fn is_applied(&self) -> bool {
        matches!(self, ProcessOutcome::Applied)
    }
}

/// Runs an effect at most once per `(event_id, consumer)`.
///
/// The check, effect and record steps for one key run under a shard lock,
/// so concurrent redeliveries inside the process cannot both pass the check.
/// Across processes the ledger's unique key is the backstop.
pub struct IdempotentProcessor<L: EventLedger> {
    ledger: Arc<L>,
    locks: Arc<Vec<Mutex<()>>>,
}

impl<L: EventLedger> Clone for IdempotentProcessor<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<L: EventLedger> IdempotentProcessor<L> {
    /// Creates a processor over the given ledger.
    pub fn new(ledger: L) -> Self {
        Self::with_shards(ledger, DEFAULT_SHARDS)
    }

    /// Creates a processor with a specific number of lock shards.
    pub fn with_shards(ledger: L, shards: usize) -> Self {
        let locks = (0..shards.max(1)).map(|_| Mutex::new(())).collect();
        Self {
            ledger: Arc::new(ledger),
            locks: Arc::new(locks),
        }
    }

    /// Gets a reference to the underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    fn shard_for(&self, event_id: EventId, consumer: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        event_id.hash(&mut hasher);
        consumer.hash(&mut hasher);
        let index = (hasher.finish() % self.locks.len() as u64) as usize;
        &self.locks[index]
    }

    /// Applies `effect` unless the ledger already holds `(event_id, consumer)`.
    ///
    /// On effect failure no ledger row is written and the error is returned,
    /// so the next delivery of the same event retries the effect.
    #[tracing::instrument(skip(self, effect))]
    pub async fn process<F, Fut, E>(
        &self,
        event_id: EventId,
        consumer: &str,
        effect: F,
    ) -> Result<ProcessOutcome, ConsumeError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::error::Error + 'static,
    {
        let _guard = self.shard_for(event_id, consumer).lock().await;

        if self.ledger.is_processed(event_id, consumer).await? {
            tracing::debug!("event already processed, skipping");
            metrics::counter!("ledger_events_skipped", "consumer" => consumer.to_string())
                .increment(1);
            return Ok(ProcessOutcome::Skipped);
        }

        if let Err(e) = effect().await {
            tracing::warn!(error = %e, "event effect failed, no ledger row written");
            return Err(ConsumeError::Effect(e));
        }

        match self.ledger.record(event_id, consumer).await? {
            RecordOutcome::Recorded => {}
            RecordOutcome::AlreadyRecorded => {
                tracing::warn!("ledger row written concurrently by another process");
            }
        }

        metrics::counter!("ledger_events_applied", "consumer" => consumer.to_string())
            .increment(1);

        Ok(ProcessOutcome::Applied)
    }
}
