//! PostgreSQL integration tests for the reservation engine.
//!
//! These tests need Docker and are ignored by default. Run with:
//!
//! ```bash
//! cargo test -p inventory --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{Money, OrderId, ProductId};
use inventory::{
    InventoryError, PostgresReservationEngine, Product, ReservationEngine, ReservationStatus,
    ReserveItem, ReserveRequest,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_saga_core_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_engine() -> PostgresReservationEngine {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE inventory_reservations, products")
        .execute(&pool)
        .await
        .unwrap();

    PostgresReservationEngine::new(pool)
}

async fn seed(engine: &PostgresReservationEngine, stock: u32) -> ProductId {
    let product = Product::new("Widget", Money::from_cents(1000), stock);
    engine.upsert_product(&product).await.unwrap();
    product.product_id
}

fn request(order_id: OrderId, items: &[(ProductId, u32)]) -> ReserveRequest {
    ReserveRequest::new(
        order_id,
        items
            .iter()
            .map(|&(id, qty)| ReserveItem::new(id, qty))
            .collect(),
    )
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn reserve_then_release_conserves_stock() {
    let engine = get_test_engine().await;
    let a = seed(&engine, 10).await;
    let b = seed(&engine, 5).await;
    let order_id = OrderId::new();

    let result = engine
        .reserve(&request(order_id, &[(a, 3), (b, 2)]))
        .await
        .unwrap();
    assert_eq!(result.items.len(), 2);

    let product = engine.product(a).await.unwrap();
    assert_eq!((product.available_quantity, product.reserved_quantity), (7, 3));

    let outcome = engine.release(order_id).await.unwrap();
    assert_eq!(outcome.reservations, 2);
    assert!(engine.release(order_id).await.unwrap().is_noop());

    let product = engine.product(a).await.unwrap();
    assert_eq!((product.available_quantity, product.reserved_quantity), (10, 0));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn shortfall_reserves_nothing() {
    let engine = get_test_engine().await;
    let a = seed(&engine, 10).await;
    let b = seed(&engine, 1).await;
    let order_id = OrderId::new();

    let err = engine
        .reserve(&request(order_id, &[(a, 2), (b, 5)]))
        .await
        .unwrap_err();

    match err {
        InventoryError::InsufficientStock(unavailable) => {
            assert_eq!(unavailable.len(), 1);
            assert_eq!(unavailable[0].product_id, b);
            assert_eq!(unavailable[0].available, 1);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert_eq!(engine.product(a).await.unwrap().available_quantity, 10);
    assert!(engine.reservations_for(order_id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn commit_removes_stock() {
    let engine = get_test_engine().await;
    let a = seed(&engine, 10).await;
    let order_id = OrderId::new();

    engine.reserve(&request(order_id, &[(a, 4)])).await.unwrap();
    engine.commit(order_id).await.unwrap();

    let product = engine.product(a).await.unwrap();
    assert_eq!((product.available_quantity, product.reserved_quantity), (6, 0));
    let rows = engine.reservations_for(order_id).await.unwrap();
    assert_eq!(rows[0].status, ReservationStatus::Committed);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn settled_order_cannot_reserve_again() {
    let engine = get_test_engine().await;
    let a = seed(&engine, 10).await;
    let order_id = OrderId::new();

    engine.reserve(&request(order_id, &[(a, 4)])).await.unwrap();
    engine.commit(order_id).await.unwrap();

    let err = engine
        .reserve(&request(order_id, &[(a, 4)]))
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::AlreadySettled(id) if id == order_id));

    let product = engine.product(a).await.unwrap();
    assert_eq!((product.available_quantity, product.reserved_quantity), (6, 0));
    assert_eq!(engine.reservations_for(order_id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn upsert_keeps_stock_counters() {
    let engine = get_test_engine().await;
    let a = seed(&engine, 10).await;
    let order_id = OrderId::new();
    engine.reserve(&request(order_id, &[(a, 3)])).await.unwrap();

    let mut renamed = engine.product(a).await.unwrap();
    renamed.name = "Renamed".to_string();
    renamed.available_quantity = 50;
    renamed.reserved_quantity = 0;
    engine.upsert_product(&renamed).await.unwrap();

    let stored = engine.product(a).await.unwrap();
    assert_eq!(stored.name, "Renamed");
    assert_eq!((stored.available_quantity, stored.reserved_quantity), (7, 3));

    engine.release(order_id).await.unwrap();
    let stored = engine.product(a).await.unwrap();
    assert_eq!((stored.available_quantity, stored.reserved_quantity), (10, 0));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn expiry_releases_only_past_due_rows() {
    let engine = get_test_engine().await;
    let a = seed(&engine, 10).await;

    let stale = OrderId::new();
    let fresh = OrderId::new();
    engine
        .clone()
        .with_ttl(Duration::minutes(1))
        .reserve(&request(stale, &[(a, 2)]))
        .await
        .unwrap();
    engine.reserve(&request(fresh, &[(a, 3)])).await.unwrap();

    let released = engine
        .expire_at(Utc::now() + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(released.len(), 1);
    assert_eq!(released[0].order_id, stale);
    let product = engine.product(a).await.unwrap();
    assert_eq!((product.available_quantity, product.reserved_quantity), (7, 3));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn concurrent_reserves_never_oversell() {
    let engine = get_test_engine().await;
    let a = seed(&engine, 5).await;

    let attempts = (0..12).map(|_| {
        let engine = engine.clone();
        async move { engine.reserve(&request(OrderId::new(), &[(a, 1)])).await }
    });
    let results = futures_util::future::join_all(attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
    let product = engine.product(a).await.unwrap();
    assert_eq!((product.available_quantity, product.reserved_quantity), (0, 5));
}
