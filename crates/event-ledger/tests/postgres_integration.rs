//! PostgreSQL integration tests for the event ledger.
//!
//! These tests need Docker and are ignored by default. Run with:
//!
//! ```bash
//! cargo test -p event-ledger --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use event_ledger::{
    ConsumeError, EventId, EventLedger, IdempotentProcessor, PostgresEventLedger, ProcessOutcome,
    RecordOutcome,
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

async fn get_test_ledger() -> PostgresEventLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE processed_events")
        .execute(&pool)
        .await
        .unwrap();

    PostgresEventLedger::new(pool)
}

#[derive(Debug, thiserror::Error)]
#[error("boom")]
struct Boom;

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn record_is_insert_if_absent() {
    let ledger = get_test_ledger().await;
    let event_id = EventId::new();

    assert!(!ledger.is_processed(event_id, "inventory").await.unwrap());
    assert_eq!(
        ledger.record(event_id, "inventory").await.unwrap(),
        RecordOutcome::Recorded
    );
    assert_eq!(
        ledger.record(event_id, "inventory").await.unwrap(),
        RecordOutcome::AlreadyRecorded
    );
    assert!(ledger.is_processed(event_id, "inventory").await.unwrap());
    assert_eq!(ledger.count_for_consumer("inventory").await.unwrap(), 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn get_reads_back_row() {
    let ledger = get_test_ledger().await;
    let event_id = EventId::new();

    ledger.record(event_id, "analytics").await.unwrap();
    let row = ledger.get(event_id, "analytics").await.unwrap().unwrap();

    assert_eq!(row.event_id, event_id);
    assert_eq!(row.consumer_name, "analytics");
    assert!(ledger.get(event_id, "inventory").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn concurrent_records_insert_one_row() {
    let ledger = get_test_ledger().await;
    let event_id = EventId::new();

    let attempts = (0..8).map(|_| {
        let ledger = ledger.clone();
        async move { ledger.record(event_id, "inventory").await.unwrap() }
    });
    let outcomes = futures_util::future::join_all(attempts).await;

    assert_eq!(outcomes.iter().filter(|o| o.is_recorded()).count(), 1);
    assert_eq!(ledger.count_for_consumer("inventory").await.unwrap(), 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn processor_over_postgres_skips_redelivery() {
    let processor = IdempotentProcessor::new(get_test_ledger().await);
    let event_id = EventId::new();

    let failed = processor
        .process(event_id, "consumer", || async { Err(Boom) })
        .await;
    assert!(matches!(failed, Err(ConsumeError::Effect(Boom))));

    let first = processor
        .process(event_id, "consumer", || async { Ok::<(), Boom>(()) })
        .await
        .unwrap();
    let second = processor
        .process(event_id, "consumer", || async { Ok::<(), Boom>(()) })
        .await
        .unwrap();

    assert_eq!(first, ProcessOutcome::Applied);
    assert_eq!(second, ProcessOutcome::Skipped);
}
