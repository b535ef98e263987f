use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, SagaId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, SagaContext, SagaError, SagaInstance, SagaRepository, SagaStatus, SagaStepExecution,
    StepStatus,
};

const STEP_COLUMNS: &str = "id, saga_id, step_name, status, executed_at, error_message";

/// PostgreSQL-backed saga repository.
///
/// The `(order_id, saga_type)` unique key makes a duplicate trigger fail on
/// insert; `(saga_id, step_name)` backs the step upsert.
#[derive(Clone)]
pub struct PostgresSagaRepository {
    pool: PgPool,
}

impl PostgresSagaRepository {
    /// Creates a new repository over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_saga(row: PgRow) -> Result<SagaInstance> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<SagaStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let current_step: i32 = row.try_get("current_step")?;
        let payload: serde_json::Value = row.try_get("payload")?;

        Ok(SagaInstance {
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            saga_type: row.try_get("saga_type")?,
            status,
            current_step: u32::try_from(current_step)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            payload: SagaContext::from_value(payload)?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn row_to_step(row: PgRow) -> Result<SagaStepExecution> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<StepStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(SagaStepExecution {
            id: row.try_get("id")?,
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            step_name: row.try_get("step_name")?,
            status,
            executed_at: row.try_get::<DateTime<Utc>, _>("executed_at")?,
            error_message: row.try_get("error_message")?,
        })
    }
}

#[async_trait]
impl SagaRepository for PostgresSagaRepository {
    #[tracing::instrument(skip(self, saga), fields(saga_id = %saga.saga_id, order_id = %saga.order_id))]
    async fn create(&self, saga: &SagaInstance) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO saga_instances
                (id, order_id, saga_type, status, current_step, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(saga.saga_id.as_uuid())
        .bind(saga.order_id.as_uuid())
        .bind(&saga.saga_type)
        .bind(saga.status.as_str())
        .bind(saga.current_step as i32)
        .bind(serde_json::to_value(&saga.payload)?)
        .bind(saga.created_at)
        .bind(saga.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(SagaError::AlreadyExists {
                    order_id: saga.order_id,
                    saga_type: saga.saga_type.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, saga_type, status, current_step, payload, created_at, updated_at
            FROM saga_instances
            WHERE id = $1
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_saga).transpose()
    }

    async fn find_by_order(
        &self,
        order_id: OrderId,
        saga_type: &str,
    ) -> Result<Option<SagaInstance>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, saga_type, status, current_step, payload, created_at, updated_at
            FROM saga_instances
            WHERE order_id = $1 AND saga_type = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(saga_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_saga).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(&self, saga_id: SagaId, status: SagaStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let current: String =
            sqlx::query_scalar("SELECT status FROM saga_instances WHERE id = $1 FOR UPDATE")
                .bind(saga_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(SagaError::NotFound(saga_id))?;
        let current = current
            .parse::<SagaStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        if !current.can_transition_to(status) {
            return Err(SagaError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        sqlx::query("UPDATE saga_instances SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(saga_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_progress(
        &self,
        saga_id: SagaId,
        current_step: u32,
        payload: &SagaContext,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE saga_instances
            SET current_step = $1, payload = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(current_step as i32)
        .bind(serde_json::to_value(payload)?)
        .bind(Utc::now())
        .bind(saga_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SagaError::NotFound(saga_id));
        }
        Ok(())
    }

    async fn record_step(
        &self,
        saga_id: SagaId,
        step_name: &str,
        status: StepStatus,
        error_message: Option<String>,
    ) -> Result<SagaStepExecution> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO saga_step_executions (id, saga_id, step_name, status, executed_at, error_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (saga_id, step_name) DO UPDATE
            SET status = EXCLUDED.status,
                executed_at = EXCLUDED.executed_at,
                error_message = EXCLUDED.error_message
            RETURNING {STEP_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(saga_id.as_uuid())
        .bind(step_name)
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(error_message)
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok(row) => Self::row_to_step(row),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(SagaError::NotFound(saga_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn steps_for(&self, saga_id: SagaId) -> Result<Vec<SagaStepExecution>> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM saga_step_executions WHERE saga_id = $1 ORDER BY executed_at ASC"
        ))
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_step).collect()
    }

    async fn successful_steps(&self, saga_id: SagaId) -> Result<Vec<SagaStepExecution>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {STEP_COLUMNS}
            FROM saga_step_executions
            WHERE saga_id = $1 AND status = 'SUCCESS'
            ORDER BY executed_at DESC
            "#
        ))
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_step).collect()
    }

    async fn mark_compensated(&self, saga_id: SagaId, step_name: &str) -> Result<()> {
        sqlx::query(
            "UPDATE saga_step_executions SET status = 'COMPENSATED' WHERE saga_id = $1 AND step_name = $2",
        )
        .bind(saga_id.as_uuid())
        .bind(step_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unresolved_compensations(&self) -> Result<Vec<SagaStepExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.saga_id, e.step_name, e.status, e.executed_at, e.error_message
            FROM saga_step_executions e
            JOIN saga_instances s ON s.id = e.saga_id
            WHERE s.status = 'COMPENSATED' AND e.status = 'SUCCESS'
            ORDER BY e.executed_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_step).collect()
    }
}
