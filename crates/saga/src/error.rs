//! Saga error types.

use std::time::Duration;

use common::{OrderId, ProductId, SagaId};
use event_bus::BusError;
use inventory::{InventoryError, UnavailableProduct};
use orders::OrderError;
use thiserror::Error;

use crate::SagaStatus;

/// Errors that can occur during saga operations.
///
/// Step failures never appear here; the orchestrator turns them into saga
/// state. These are failures of the orchestrator's own storage and of
/// order placement.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No saga with this id exists.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// A saga of this type already exists for the order.
    #[error("Saga {saga_type} already exists for order {order_id}")]
    AlreadyExists { order_id: OrderId, saga_type: String },

    /// A status change would move the saga backwards.
    #[error("Invalid saga transition from {from} to {to}")]
    InvalidTransition { from: SagaStatus, to: SagaStatus },

    /// The placement request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An inventory lookup did not finish in time.
    #[error("Inventory lookup timed out after {0:?}")]
    LookupTimeout(Duration),

    /// Order error.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Inventory client error.
    #[error("Inventory client error: {0}")]
    Client(#[from] ClientError),

    /// Event bus error.
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Errors returned by an [`InventoryClient`](crate::InventoryClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Stock cannot cover the request; lists every short item.
    #[error("{message}")]
    Rejected {
        message: String,
        unavailable_products: Vec<UnavailableProduct>,
    },

    /// The inventory service refused the request as malformed.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The product does not exist.
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    /// The inventory service failed or answered unexpectedly.
    #[error("Inventory service unavailable: {0}")]
    Unavailable(String),

    /// Transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<InventoryError> for ClientError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientStock(unavailable_products) => ClientError::Rejected {
                message: "Insufficient stock".to_string(),
                unavailable_products,
            },
            InventoryError::Validation(message) => ClientError::Validation(message),
            InventoryError::ProductNotFound(product_id) => ClientError::ProductNotFound(product_id),
            err @ InventoryError::AlreadySettled(_) => ClientError::Validation(err.to_string()),
            other => ClientError::Unavailable(other.to_string()),
        }
    }
}

/// Kind of step failure, logged as the `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepErrorKind {
    /// Expected refusal, such as insufficient stock.
    Rejected,
    /// The step's input was malformed.
    Validation,
    /// Infrastructure failure.
    Transient,
    /// The step did not finish within its timeout.
    Timeout,
}

impl StepErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepErrorKind::Rejected => "rejected",
            StepErrorKind::Validation => "validation",
            StepErrorKind::Transient => "transient",
            StepErrorKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure of a step action or compensation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StepError {
    kind: StepErrorKind,
    message: String,
}

impl StepError {
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Rejected, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Validation, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Transient, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            StepErrorKind::Timeout,
            format!("timed out after {}ms", after.as_millis()),
        )
    }

    pub fn kind(&self) -> StepErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ClientError> for StepError {
    fn from(err: ClientError) -> Self {
        let kind = match &err {
            ClientError::Rejected { .. } | ClientError::ProductNotFound(_) => {
                StepErrorKind::Rejected
            }
            ClientError::Validation(_) => StepErrorKind::Validation,
            ClientError::Http(e) if e.is_timeout() => StepErrorKind::Timeout,
            ClientError::Unavailable(_) | ClientError::Http(_) => StepErrorKind::Transient,
        };
        let message = match &err {
            ClientError::Rejected {
                message,
                unavailable_products,
            } => {
                let products: Vec<String> = unavailable_products
                    .iter()
                    .map(|p| format!("{} ({}/{})", p.product_id, p.available, p.requested))
                    .collect();
                format!("{message}: {}", products.join(", "))
            }
            other => other.to_string(),
        };
        StepError::new(kind, message)
    }
}

impl From<OrderError> for StepError {
    fn from(err: OrderError) -> Self {
        let kind = match &err {
            OrderError::NotFound(_) | OrderError::InvalidTransition { .. } => {
                StepErrorKind::Rejected
            }
            OrderError::Validation(_) => StepErrorKind::Validation,
            OrderError::Database(_) | OrderError::Serialization(_) => StepErrorKind::Transient,
        };
        StepError::new(kind, err.to_string())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        StepError::transient(err.to_string())
    }
}

impl From<BusError> for StepError {
    fn from(err: BusError) -> Self {
        StepError::transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_becomes_rejection_listing_products() {
        let product_id = ProductId::new();
        let err: ClientError = InventoryError::InsufficientStock(vec![UnavailableProduct {
            product_id,
            requested: 3,
            available: 1,
        }])
        .into();
        assert!(matches!(err, ClientError::Rejected { .. }));

        let step: StepError = err.into();
        assert_eq!(step.kind(), StepErrorKind::Rejected);
        assert!(step.message().starts_with("Insufficient stock"));
        assert!(step.message().contains(&product_id.to_string()));
    }

    #[test]
    fn storage_failures_are_transient() {
        let step: StepError = OrderError::Database(sqlx::Error::PoolTimedOut).into();
        assert_eq!(step.kind(), StepErrorKind::Transient);

        let step: StepError = ClientError::Unavailable("503".to_string()).into();
        assert_eq!(step.kind(), StepErrorKind::Transient);
    }

    #[test]
    fn invalid_transition_is_a_rejection() {
        let step: StepError = OrderError::InvalidTransition {
            from: orders::OrderStatus::Cancelled,
            to: orders::OrderStatus::Confirmed,
        }
        .into();
        assert_eq!(step.kind(), StepErrorKind::Rejected);
    }

    #[test]
    fn timeout_message_names_duration() {
        let step = StepError::timeout(Duration::from_millis(250));
        assert_eq!(step.kind(), StepErrorKind::Timeout);
        assert_eq!(step.to_string(), "timed out after 250ms");
    }
}
