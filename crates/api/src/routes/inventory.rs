//! Reservation and product catalogue endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use common::{CorrelationId, Money, OrderId, ProductId};
use inventory::{Product, ProductPage, ReservationEngine, ReservationResult, ReserveRequest, SettleOutcome};
use saga::client::CORRELATION_HEADER;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::{AppState, Backend};

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 10;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_id: OrderId,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub available_quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub message: &'static str,
    pub order_id: OrderId,
    pub reservations: usize,
}

impl SettleResponse {
    fn new(outcome: SettleOutcome, done: &'static str) -> Self {
        let message = if outcome.is_noop() {
            "No reservations found for this order"
        } else {
            done
        };
        Self {
            message,
            order_id: outcome.order_id,
            reservations: outcome.reservations,
        }
    }
}

// -- Handlers --

/// POST /inventory/reserve — reserve stock for every line of an order.
#[tracing::instrument(skip(state, headers, request), fields(order_id = %request.order_id))]
pub async fn reserve<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    headers: HeaderMap,
    Json(request): Json<ReserveRequest>,
) -> Result<Json<ReservationResult>, ApiError> {
    let result = state
        .inventory
        .reserve(&request, correlation_id(&headers))
        .await?;
    Ok(Json(result))
}

/// POST /inventory/release — release an order's reservations.
#[tracing::instrument(skip(state, body), fields(order_id = %body.order_id))]
pub async fn release<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(body): Json<OrderRef>,
) -> Result<Json<SettleResponse>, ApiError> {
    let outcome = state.inventory.release(body.order_id).await?;
    Ok(Json(SettleResponse::new(outcome, "Reservations released")))
}

/// POST /inventory/commit — mark an order's reservations as sold.
#[tracing::instrument(skip(state, body), fields(order_id = %body.order_id))]
pub async fn commit<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(body): Json<OrderRef>,
) -> Result<Json<SettleResponse>, ApiError> {
    let outcome = state.inventory.commit(body.order_id).await?;
    Ok(Json(SettleResponse::new(outcome, "Reservations committed")))
}

/// GET /inventory/products — one page of the catalogue.
pub async fn list_products<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ProductPage>, ApiError> {
    let page = state
        .inventory
        .products(
            query.page.unwrap_or(DEFAULT_PAGE),
            query.limit.unwrap_or(DEFAULT_LIMIT),
        )
        .await?;
    Ok(Json(page))
}

/// GET /inventory/products/:id — load one product.
pub async fn get_product<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id = ProductId::parse(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid product id: {e}")))?;
    Ok(Json(state.inventory.product(product_id).await?))
}

/// POST /inventory/products — add a product to the catalogue.
#[tracing::instrument(skip(state, body), fields(name = %body.name))]
pub async fn create_product<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(body): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    if body.price.cents() < 0 {
        return Err(ApiError::BadRequest("price must not be negative".to_string()));
    }

    let product = Product::new(body.name, body.price, body.available_quantity);
    state.inventory.engine().upsert_product(&product).await?;
    tracing::info!(product_id = %product.product_id, "product created");

    Ok((StatusCode::CREATED, Json(product)))
}

/// Reads the caller's correlation id; a malformed header is ignored.
fn correlation_id(headers: &HeaderMap) -> Option<CorrelationId> {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| CorrelationId::parse(v).ok())
}
