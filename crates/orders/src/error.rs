use common::OrderId;
use thiserror::Error;

use crate::OrderStatus;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order does not exist.
    #[error("Order {0} not found")]
    NotFound(OrderId),

    /// The requested status change is not allowed.
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The order request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored items could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;
