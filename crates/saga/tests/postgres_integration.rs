//! PostgreSQL integration tests for the saga repository and a full saga run.
//!
//! These tests need Docker and are ignored by default. Run with:
//!
//! ```bash
//! cargo test -p saga --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use common::{CorrelationId, Money, OrderId, UserId};
use event_bus::{InMemoryEventBus, topics};
use inventory::{InventoryService, PostgresReservationEngine, Product, ReservationEngine};
use orders::{Order, OrderItem, OrderRepository, OrderStatus, PostgresOrderRepository};
use saga::{
    LocalInventoryClient, PostgresSagaRepository, SagaContext, SagaError, SagaInstance,
    SagaOrchestrator, SagaOutcome, SagaRepository, SagaServices, SagaStatus, SagaType, StepStatus,
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

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE saga_step_executions, saga_instances, inventory_reservations, products, orders",
    )
    .execute(&pool)
    .await
    .unwrap();

    pool
}

fn saga_for(order_id: OrderId) -> SagaInstance {
    let mut ctx = SagaContext::new();
    ctx.insert("orderId", order_id).unwrap();
    ctx.insert("correlationId", CorrelationId::new()).unwrap();
    SagaInstance::new(order_id, "CreateOrder", ctx)
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn create_rejects_second_saga_for_order() {
    let repo = PostgresSagaRepository::new(get_test_pool().await);
    let order_id = OrderId::new();

    repo.create(&saga_for(order_id)).await.unwrap();
    let err = repo.create(&saga_for(order_id)).await.unwrap_err();
    assert!(matches!(err, SagaError::AlreadyExists { .. }));

    let found = repo.find_by_order(order_id, "CreateOrder").await.unwrap();
    assert!(found.is_some());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn status_moves_forward_only() {
    let repo = PostgresSagaRepository::new(get_test_pool().await);
    let saga = saga_for(OrderId::new());
    repo.create(&saga).await.unwrap();

    repo.update_status(saga.saga_id, SagaStatus::Completed)
        .await
        .unwrap();
    let err = repo
        .update_status(saga.saga_id, SagaStatus::Compensating)
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::InvalidTransition { .. }));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn record_step_upserts_one_row_per_step() {
    let repo = PostgresSagaRepository::new(get_test_pool().await);
    let saga = saga_for(OrderId::new());
    repo.create(&saga).await.unwrap();

    repo.record_step(saga.saga_id, "reserve-inventory", StepStatus::Pending, None)
        .await
        .unwrap();
    repo.record_step(saga.saga_id, "reserve-inventory", StepStatus::Success, None)
        .await
        .unwrap();
    repo.record_step(
        saga.saga_id,
        "confirm-order",
        StepStatus::Failed,
        Some("boom".to_string()),
    )
    .await
    .unwrap();

    let steps = repo.steps_for(saga.saga_id).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].error_message.as_deref(), Some("boom"));

    let successful = repo.successful_steps(saga.saga_id).await.unwrap();
    assert_eq!(successful.len(), 1);
    assert_eq!(successful[0].step_name, "reserve-inventory");

    let unknown = saga_for(OrderId::new());
    let err = repo
        .record_step(unknown.saga_id, "reserve-inventory", StepStatus::Pending, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::NotFound(_)));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn create_order_saga_over_postgres() {
    let pool = get_test_pool().await;
    let engine = Arc::new(PostgresReservationEngine::new(pool.clone()));
    let widget = Product::new("Widget", Money::from_cents(1000), 5);
    let gadget = Product::new("Gadget", Money::from_cents(2500), 1);
    engine.upsert_product(&widget).await.unwrap();
    engine.upsert_product(&gadget).await.unwrap();

    let bus = Arc::new(InMemoryEventBus::new());
    let orders = Arc::new(PostgresOrderRepository::new(pool.clone()));
    let client = LocalInventoryClient::new(InventoryService::new(
        Arc::clone(&engine),
        Arc::clone(&bus),
    ));
    let orchestrator = SagaOrchestrator::new(
        Arc::new(PostgresSagaRepository::new(pool)),
        SagaServices::new(Arc::new(client), Arc::clone(&orders), Arc::clone(&bus)),
    );

    let ok = Order::new(
        UserId::new(),
        vec![OrderItem::new(widget.product_id, 2, widget.price)],
    );
    orders.create(&ok).await.unwrap();
    let outcome = orchestrator.execute(SagaType::CreateOrder, &ok).await.unwrap();
    assert!(matches!(outcome, SagaOutcome::Completed(_)));
    assert_eq!(
        orders.find_one(ok.id).await.unwrap().unwrap().status,
        OrderStatus::Confirmed
    );

    let short = Order::new(
        UserId::new(),
        vec![
            OrderItem::new(widget.product_id, 1, widget.price),
            OrderItem::new(gadget.product_id, 3, gadget.price),
        ],
    );
    orders.create(&short).await.unwrap();
    let outcome = orchestrator
        .execute(SagaType::CreateOrder, &short)
        .await
        .unwrap();
    assert!(matches!(outcome, SagaOutcome::Compensated(_)));

    let report = orchestrator
        .report(short.id, SagaType::CreateOrder)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.saga.status, SagaStatus::Compensated);
    assert_eq!(report.steps[0].status, StepStatus::Failed);

    let widget_now = engine.product(widget.product_id).await.unwrap();
    assert_eq!(
        (widget_now.available_quantity, widget_now.reserved_quantity),
        (3, 2)
    );
    assert_eq!(bus.published(topics::ORDERS_CONFIRMED).await.len(), 1);
}
