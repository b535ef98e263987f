use common::{OrderId, ProductId};
use event_bus::BusError;
use thiserror::Error;

use crate::UnavailableProduct;

/// Errors that can occur during inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A requested product does not exist.
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    /// At least one item cannot be covered by available stock.
    ///
    /// Lists every short item, not only the first.
    #[error("Insufficient stock for {} product(s)", .0.len())]
    InsufficientStock(Vec<UnavailableProduct>),

    /// The order's reservations were already committed or released.
    #[error("Reservations for order {0} are already settled")]
    AlreadySettled(OrderId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An event could not be published.
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),
}

impl InventoryError {
    /// Returns true for rejections caused by the request rather than the
    /// infrastructure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            InventoryError::Validation(_)
                | InventoryError::ProductNotFound(_)
                | InventoryError::InsufficientStock(_)
                | InventoryError::AlreadySettled(_)
        )
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
