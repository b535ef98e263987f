use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{Order, OrderError, OrderItem, OrderRepository, OrderStatus, Result};

/// PostgreSQL-backed order repository.
///
/// Items are stored as a JSONB array next to the order row.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a new repository over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let items: serde_json::Value = row.try_get("items")?;
        let items: Vec<OrderItem> = serde_json::from_value(items)?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status,
            total_amount: Money::from_cents(row.try_get("total_amount")?),
            items,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_amount, items, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .bind(serde_json::to_value(&order.items)?)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_one(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount, items, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount, items, created_at, updated_at
            FROM orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(OrderError::NotFound(order_id))?;

        let mut order = Self::row_to_order(row)?;
        let previous = order.status;
        order.transition_to(status)?;

        if order.status != previous {
            sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(order.status.as_str())
                .bind(order.updated_at)
                .bind(order_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount, items, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}
