//! Order placement and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, UserId};
use orders::{CreateOrderRequest, Order, OrderRepository};
use saga::{SagaReport, SagaType};

use crate::error::ApiError;
use crate::{AppState, Backend};

/// POST /orders — store a PENDING order and start its saga.
///
/// Responds before the saga finishes; poll the order or its saga for the
/// outcome.
#[tracing::instrument(skip(state, request), fields(user_id = %request.user_id))]
pub async fn create<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.placement.place(&request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/:id — load an order.
#[tracing::instrument(skip(state))]
pub async fn get<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .orders()
        .find_one(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(order))
}

/// GET /orders/user/:user_id — a user's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn by_user<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let user_id = UserId::parse(&user_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid user id: {e}")))?;
    Ok(Json(state.orders().find_by_user(user_id).await?))
}

/// GET /orders/:id/saga — the order's saga with its step executions.
#[tracing::instrument(skip(state))]
pub async fn saga<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaReport>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let report = state
        .placement
        .orchestrator()
        .report(order_id, SagaType::CreateOrder)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No saga for order {id}")))?;
    Ok(Json(report))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}
