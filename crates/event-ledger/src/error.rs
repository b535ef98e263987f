use thiserror::Error;

/// Errors that can occur when interacting with the event ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The consumer name is empty or too long for the ledger key.
    #[error("Invalid consumer name: {0:?}")]
    InvalidConsumer(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors returned by [`IdempotentProcessor::process`](crate::IdempotentProcessor::process).
///
/// An effect failure leaves no ledger row behind, so a redelivery of the same
/// event runs the effect again.
#[derive(Debug, Error)]
pub enum ConsumeError<E>
where
    E: std::error::Error + 'static,
{
    /// The ledger could not be read or written.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The effect itself failed.
    #[error("Effect failed: {0}")]
    Effect(#[source] E),
}
