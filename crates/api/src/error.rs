//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use event_bus::BusError;
use inventory::{InventoryError, UnavailableProduct};
use orders::OrderError;
use saga::{ClientError, SagaError};
use serde::Serialize;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Reservation or catalogue error.
    Inventory(InventoryError),
    /// Order store error.
    Order(OrderError),
    /// Placement or saga store error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

/// JSON error body; `unavailableProducts` only on stock rejections.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unavailable_products: Vec<UnavailableProduct>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, unavailable_products) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Vec::new()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, Vec::new()),
            ApiError::Inventory(InventoryError::InsufficientStock(unavailable)) => (
                StatusCode::BAD_REQUEST,
                "Insufficient stock".to_string(),
                unavailable,
            ),
            ApiError::Inventory(err) => (inventory_status(&err), err.to_string(), Vec::new()),
            ApiError::Order(err) => (order_status(&err), err.to_string(), Vec::new()),
            ApiError::Saga(SagaError::Client(ClientError::Rejected {
                message,
                unavailable_products,
            })) => (StatusCode::BAD_REQUEST, message, unavailable_products),
            ApiError::Saga(err) => (saga_status(&err), err.to_string(), Vec::new()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, Vec::new()),
        };

        metrics::counter!("api_errors_total", "status" => status.as_u16().to_string()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = ErrorBody {
            message,
            unavailable_products,
        };
        (status, Json(body)).into_response()
    }
}

fn inventory_status(err: &InventoryError) -> StatusCode {
    match err {
        InventoryError::Validation(_) | InventoryError::InsufficientStock(_) => {
            StatusCode::BAD_REQUEST
        }
        InventoryError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::AlreadySettled(_) => StatusCode::CONFLICT,
        InventoryError::Database(_) | InventoryError::Bus(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn order_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
        OrderError::Validation(_) => StatusCode::BAD_REQUEST,
        OrderError::Database(_) | OrderError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::NotFound(_) => StatusCode::NOT_FOUND,
        SagaError::AlreadyExists { .. } | SagaError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        SagaError::Order(err) => order_status(err),
        // Unknown products come from the request body.
        SagaError::Client(
            ClientError::ProductNotFound(_)
            | ClientError::Validation(_)
            | ClientError::Rejected { .. },
        ) => StatusCode::BAD_REQUEST,
        SagaError::Client(_) => StatusCode::BAD_GATEWAY,
        SagaError::LookupTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        SagaError::Bus(_) | SagaError::Database(_) | SagaError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Inventory client error: {0}")]
    Client(#[from] ClientError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, ProductId};

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            order_status(&OrderError::NotFound(OrderId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            order_status(&OrderError::InvalidTransition {
                from: orders::OrderStatus::Cancelled,
                to: orders::OrderStatus::Confirmed,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            inventory_status(&InventoryError::ProductNotFound(ProductId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            inventory_status(&InventoryError::AlreadySettled(OrderId::new())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            saga_status(&SagaError::LookupTimeout(std::time::Duration::from_secs(5))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            saga_status(&SagaError::Client(ClientError::Unavailable("down".into()))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_error_body_omits_empty_shortfall() {
        let body = serde_json::to_value(ErrorBody {
            message: "nope".to_string(),
            unavailable_products: Vec::new(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "message": "nope" }));
    }
}
