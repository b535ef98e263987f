use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::record::validate_consumer_name;
use crate::{EventId, EventLedger, ProcessedEvent, RecordOutcome, Result};

/// PostgreSQL-backed event ledger.
///
/// Relies on the `(event_id, consumer_name)` primary key of the
/// `processed_events` table: an insert that hits the key is the
/// "already processed" signal.
#[derive(Clone)]
pub struct PostgresEventLedger {
    pool: PgPool,
}

impl PostgresEventLedger {
    /// Creates a new ledger over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_processed(row: PgRow) -> Result<ProcessedEvent> {
        Ok(ProcessedEvent {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            consumer_name: row.try_get("consumer_name")?,
            processed_at: row.try_get::<DateTime<Utc>, _>("processed_at")?,
        })
    }
}

#[async_trait]
impl EventLedger for PostgresEventLedger {
    async fn is_processed(&self, event_id: EventId, consumer: &str) -> Result<bool> {
        validate_consumer_name(consumer)?;
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_events WHERE event_id = $1 AND consumer_name = $2)",
        )
        .bind(event_id.as_uuid())
        .bind(consumer)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn record(&self, event_id: EventId, consumer: &str) -> Result<RecordOutcome> {
        validate_consumer_name(consumer)?;
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, consumer_name, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id, consumer_name) DO NOTHING
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(consumer)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(RecordOutcome::AlreadyRecorded)
        } else {
            Ok(RecordOutcome::Recorded)
        }
    }

    async fn get(&self, event_id: EventId, consumer: &str) -> Result<Option<ProcessedEvent>> {
        validate_consumer_name(consumer)?;
        let row = sqlx::query(
            r#"
            SELECT event_id, consumer_name, processed_at
            FROM processed_events
            WHERE event_id = $1 AND consumer_name = $2
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(consumer)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_processed).transpose()
    }

    async fn count_for_consumer(&self, consumer: &str) -> Result<u64> {
        validate_consumer_name(consumer)?;
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM processed_events WHERE consumer_name = $1")
                .bind(consumer)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }
}
