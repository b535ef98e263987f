//! HttpInventoryClient against a stub inventory server.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use common::{CorrelationId, Money, OrderId, ProductId, ReservationId};
use inventory::{Product, ReservationResult, ReserveItem, ReserveRequest};
use saga::client::CORRELATION_HEADER;
use saga::{ClientError, HttpInventoryClient, InventoryClient, StepError, StepErrorKind};
use serde_json::json;

#[derive(Clone, Default)]
struct Stub {
    /// Product that reserves fail for, with its available quantity.
    short: Arc<Mutex<Option<(ProductId, u32)>>>,
    known: Arc<Mutex<Vec<Product>>>,
    correlation: Arc<Mutex<Vec<String>>>,
    released: Arc<Mutex<Vec<OrderId>>>,
}

impl Stub {
    fn record_correlation(&self, headers: &HeaderMap) {
        if let Some(value) = headers.get(CORRELATION_HEADER) {
            self.correlation
                .lock()
                .unwrap()
                .push(value.to_str().unwrap().to_string());
        }
    }
}

async fn reserve(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(request): Json<ReserveRequest>,
) -> Response {
    stub.record_correlation(&headers);

    if request.items.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "at least one item is required" })),
        )
            .into_response();
    }

    let short = *stub.short.lock().unwrap();
    if let Some((product_id, available)) = short {
        if let Some(item) = request.items.iter().find(|i| i.product_id == product_id) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "message": "Insufficient stock",
                    "unavailableProducts": [{
                        "productId": product_id,
                        "requested": item.quantity,
                        "available": available,
                    }],
                })),
            )
                .into_response();
        }
    }

    Json(ReservationResult {
        reservation_id: ReservationId::new(),
        order_id: request.order_id,
        expires_at: Utc::now(),
        items: request.items,
    })
    .into_response()
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseBody {
    order_id: OrderId,
}

async fn release(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<ReleaseBody>,
) -> Json<serde_json::Value> {
    stub.record_correlation(&headers);
    stub.released.lock().unwrap().push(body.order_id);
    Json(json!({ "message": "released" }))
}

async fn product(State(stub): State<Stub>, Path(product_id): Path<ProductId>) -> Response {
    let known = stub.known.lock().unwrap().clone();
    match known.into_iter().find(|p| p.product_id == product_id) {
        Some(product) => Json(product).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "not found" }))).into_response(),
    }
}

async fn broken() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn spawn_stub(stub: Stub) -> String {
    let app = Router::new()
        .route("/inventory/reserve", post(reserve))
        .route("/inventory/release", post(release))
        .route("/inventory/products/{product_id}", get(product))
        .route("/broken/inventory/reserve", post(broken))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn reserve_sends_correlation_header() {
    let stub = Stub::default();
    let client = HttpInventoryClient::new(spawn_stub(stub.clone()).await).unwrap();

    let order_id = OrderId::new();
    let correlation_id = CorrelationId::new();
    let result = client
        .reserve(
            &ReserveRequest::new(order_id, vec![ReserveItem::new(ProductId::new(), 2)]),
            Some(correlation_id),
        )
        .await
        .unwrap();

    assert_eq!(result.order_id, order_id);
    assert_eq!(result.items[0].quantity, 2);
    assert_eq!(
        stub.correlation.lock().unwrap().as_slice(),
        &[correlation_id.to_string()]
    );
}

#[tokio::test]
async fn shortfall_becomes_rejection() {
    let stub = Stub::default();
    let short = ProductId::new();
    *stub.short.lock().unwrap() = Some((short, 1));
    let client = HttpInventoryClient::new(spawn_stub(stub).await).unwrap();

    let err = client
        .reserve(
            &ReserveRequest::new(OrderId::new(), vec![ReserveItem::new(short, 4)]),
            None,
        )
        .await
        .unwrap_err();

    match &err {
        ClientError::Rejected {
            message,
            unavailable_products,
        } => {
            assert_eq!(message, "Insufficient stock");
            assert_eq!(unavailable_products.len(), 1);
            assert_eq!(unavailable_products[0].product_id, short);
            assert_eq!(unavailable_products[0].requested, 4);
            assert_eq!(unavailable_products[0].available, 1);
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    assert_eq!(StepError::from(err).kind(), StepErrorKind::Rejected);
}

#[tokio::test]
async fn bad_request_without_shortfall_is_validation() {
    let client = HttpInventoryClient::new(spawn_stub(Stub::default()).await).unwrap();

    let err = client
        .reserve(&ReserveRequest::new(OrderId::new(), vec![]), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Validation(ref m) if m == "at least one item is required"));
}

#[tokio::test]
async fn server_error_is_transient() {
    let base = spawn_stub(Stub::default()).await;
    let client = HttpInventoryClient::new(format!("{base}/broken")).unwrap();

    let err = client
        .reserve(
            &ReserveRequest::new(OrderId::new(), vec![ReserveItem::new(ProductId::new(), 1)]),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Unavailable(_)));
    assert_eq!(StepError::from(err).kind(), StepErrorKind::Transient);
}

#[tokio::test]
async fn release_posts_order_id() {
    let stub = Stub::default();
    let client = HttpInventoryClient::new(spawn_stub(stub.clone()).await).unwrap();

    let order_id = OrderId::new();
    client
        .release(order_id, Some(CorrelationId::new()))
        .await
        .unwrap();

    assert_eq!(stub.released.lock().unwrap().as_slice(), &[order_id]);
    assert_eq!(stub.correlation.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn product_lookup_and_not_found() {
    let stub = Stub::default();
    let widget = Product::new("Widget", Money::from_cents(1999), 3);
    stub.known.lock().unwrap().push(widget.clone());
    let client = HttpInventoryClient::new(spawn_stub(stub).await).unwrap();

    let found = client.product(widget.product_id).await.unwrap();
    assert_eq!(found, widget);

    let missing = ProductId::new();
    let err = client.product(missing).await.unwrap_err();
    assert!(matches!(err, ClientError::ProductNotFound(id) if id == missing));
}
