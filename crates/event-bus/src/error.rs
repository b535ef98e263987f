use thiserror::Error;

/// Errors that can occur when publishing or subscribing.
#[derive(Debug, Error)]
pub enum BusError {
    /// The payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The event's type tag does not match the payload it was decoded into.
    #[error("Event type mismatch: expected {expected}, got {actual}")]
    EventTypeMismatch { expected: String, actual: String },

    /// A consumer group subscribed twice to the same topic.
    #[error("Group {group} is already subscribed to {topic}")]
    DuplicateSubscription { topic: String, group: String },

    /// The bus has been shut down.
    #[error("Event bus is closed")]
    Closed,
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
