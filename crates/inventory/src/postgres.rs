use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{Money, OrderId, ProductId, ReservationId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::engine::DEFAULT_RESERVATION_TTL_SECS;
use crate::model::validate_paging;
use crate::{
    InventoryError, InventoryReservation, Product, ProductPage, ReservationEngine,
    ReservationResult, ReservationStatus, ReserveRequest, Result, SettleOutcome,
    UnavailableProduct,
};

const RESERVATION_COLUMNS: &str =
    "id, order_id, product_id, quantity, status, expires_at, created_at";

/// PostgreSQL-backed reservation engine.
///
/// Each operation runs in one transaction. Product rows are locked with
/// `SELECT ... FOR UPDATE` in `id` order, reservation rows change status
/// through conditional `UPDATE ... WHERE status = 'RESERVED'`, and the
/// table's `CHECK` constraints keep both counters non-negative.
#[derive(Clone)]
pub struct PostgresReservationEngine {
    pool: PgPool,
    ttl: Duration,
}

impl PostgresReservationEngine {
    /// Creates a new engine with the default reservation TTL.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ttl: Duration::seconds(DEFAULT_RESERVATION_TTL_SECS),
        }
    }

    /// Sets the reservation TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price")?),
            available_quantity: row.try_get::<i32, _>("available_quantity")? as u32,
            reserved_quantity: row.try_get::<i32, _>("reserved_quantity")? as u32,
        })
    }

    fn row_to_reservation(row: &PgRow) -> Result<InventoryReservation> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<ReservationStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(InventoryReservation {
            reservation_id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            status,
            expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    /// Serializes concurrent reserves of the same order.
    async fn lock_order(tx: &mut Transaction<'_, Postgres>, order_id: OrderId) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(order_id.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Applies the counter change of settled reservation rows.
    ///
    /// Rows are processed in `product_id` order so concurrent settlements
    /// lock products in the same sequence.
    async fn apply_settlement(
        tx: &mut Transaction<'_, Postgres>,
        rows: &mut [InventoryReservation],
        target: ReservationStatus,
    ) -> Result<()> {
        rows.sort_by_key(|r| r.product_id);
        let restock = target == ReservationStatus::Released;

        for row in rows.iter() {
            let quantity = row.quantity as i32;
            sqlx::query(
                r#"
                UPDATE products
                SET available_quantity = available_quantity + CASE WHEN $3 THEN $1 ELSE 0 END,
                    reserved_quantity = reserved_quantity - $1,
                    updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(quantity)
            .bind(row.product_id.as_uuid())
            .bind(restock)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn settle_order(
        &self,
        order_id: OrderId,
        target: ReservationStatus,
    ) -> Result<SettleOutcome> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            r#"
            UPDATE inventory_reservations
            SET status = $1, updated_at = NOW()
            WHERE order_id = $2 AND status = 'RESERVED'
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(target.as_str())
        .bind(order_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?;

        let mut settled = rows
            .iter()
            .map(Self::row_to_reservation)
            .collect::<Result<Vec<_>>>()?;
        Self::apply_settlement(&mut tx, &mut settled, target).await?;

        tx.commit().await?;

        Ok(SettleOutcome {
            order_id,
            reservations: settled.len(),
        })
    }

    async fn existing_reservation(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
    ) -> Result<Option<ReservationResult>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM inventory_reservations
            WHERE order_id = $1
            ORDER BY created_at, id
            "#
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&mut **tx)
        .await?;

        let rows = rows
            .iter()
            .map(Self::row_to_reservation)
            .collect::<Result<Vec<_>>>()?;
        ReservationResult::from_existing(order_id, &rows)
    }
}

#[async_trait]
impl ReservationEngine for PostgresReservationEngine {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn reserve(&self, request: &ReserveRequest) -> Result<ReservationResult> {
        request.validate()?;
        let mut tx = self.pool.begin().await?;

        Self::lock_order(&mut tx, request.order_id).await?;
        if let Some(existing) = Self::existing_reservation(&mut tx, request.order_id).await? {
            tracing::info!("order already holds a reservation, returning it");
            return Ok(existing);
        }

        let ids: Vec<Uuid> = request.items.iter().map(|i| i.product_id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, name, price, available_quantity, reserved_quantity
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let products = rows
            .iter()
            .map(Self::row_to_product)
            .collect::<Result<Vec<_>>>()?;

        let mut unavailable = Vec::new();
        for item in &request.items {
            let product = products
                .iter()
                .find(|p| p.product_id == item.product_id)
                .ok_or(InventoryError::ProductNotFound(item.product_id))?;
            if product.available_quantity < item.quantity {
                unavailable.push(UnavailableProduct {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: product.available_quantity,
                });
            }
        }
        if !unavailable.is_empty() {
            return Err(InventoryError::InsufficientStock(unavailable));
        }

        let mut by_product = request.items.clone();
        by_product.sort_by_key(|i| i.product_id);
        for item in &by_product {
            let quantity = item.quantity as i32;
            let updated = sqlx::query(
                r#"
                UPDATE products
                SET available_quantity = available_quantity - $1,
                    reserved_quantity = reserved_quantity + $1,
                    updated_at = NOW()
                WHERE id = $2 AND available_quantity >= $1
                "#,
            )
            .bind(quantity)
            .bind(item.product_id.as_uuid())
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() != 1 {
                return Err(InventoryError::InsufficientStock(vec![UnavailableProduct {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: 0,
                }]));
            }
        }

        let now = Utc::now();
        let expires_at = now + self.ttl;
        let mut created = Vec::with_capacity(request.items.len());

        for item in &request.items {
            let reservation = InventoryReservation {
                reservation_id: ReservationId::new(),
                order_id: request.order_id,
                product_id: item.product_id,
                quantity: item.quantity,
                status: ReservationStatus::Reserved,
                expires_at,
                created_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO inventory_reservations
                    (id, order_id, product_id, quantity, status, expires_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                "#,
            )
            .bind(reservation.reservation_id.as_uuid())
            .bind(reservation.order_id.as_uuid())
            .bind(reservation.product_id.as_uuid())
            .bind(reservation.quantity as i32)
            .bind(reservation.status.as_str())
            .bind(reservation.expires_at)
            .bind(reservation.created_at)
            .execute(&mut *tx)
            .await?;

            created.push(reservation);
        }

        tx.commit().await?;

        ReservationResult::from_rows(request.order_id, &created)
            .ok_or_else(|| InventoryError::Validation("at least one item is required".to_string()))
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, order_id: OrderId) -> Result<SettleOutcome> {
        self.settle_order(order_id, ReservationStatus::Released).await
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&self, order_id: OrderId) -> Result<SettleOutcome> {
        self.settle_order(order_id, ReservationStatus::Committed).await
    }

    async fn expire_at(&self, now: DateTime<Utc>) -> Result<Vec<InventoryReservation>> {
        let candidates: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM inventory_reservations
            WHERE status = 'RESERVED' AND expires_at < $1
            ORDER BY expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut released = Vec::with_capacity(candidates.len());
        for id in candidates {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query(&format!(
                r#"
                UPDATE inventory_reservations
                SET status = 'RELEASED', updated_at = NOW()
                WHERE id = $1 AND status = 'RESERVED'
                RETURNING {RESERVATION_COLUMNS}
                "#
            ))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

            // Settled by a concurrent commit or release since the scan.
            let Some(row) = row else {
                continue;
            };

            let mut settled = vec![Self::row_to_reservation(&row)?];
            Self::apply_settlement(&mut tx, &mut settled, ReservationStatus::Released).await?;
            tx.commit().await?;

            let reservation = settled.remove(0);
            tracing::info!(
                reservation_id = %reservation.reservation_id,
                order_id = %reservation.order_id,
                "released expired reservation"
            );
            released.push(reservation);
        }

        Ok(released)
    }

    async fn product(&self, product_id: ProductId) -> Result<Product> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price, available_quantity, reserved_quantity
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(InventoryError::ProductNotFound(product_id))?;

        Self::row_to_product(&row)
    }

    async fn products(&self, page: u32, limit: u32) -> Result<ProductPage> {
        validate_paging(page, limit)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        let offset = (i64::from(page) - 1) * i64::from(limit);
        let rows = sqlx::query(
            r#"
            SELECT id, name, price, available_quantity, reserved_quantity
            FROM products
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let products = rows
            .iter()
            .map(Self::row_to_product)
            .collect::<Result<Vec<_>>>()?;

        Ok(ProductPage::new(products, total as u64, page, limit))
    }

    async fn reservations_for(&self, order_id: OrderId) -> Result<Vec<InventoryReservation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM inventory_reservations
            WHERE order_id = $1
            ORDER BY created_at, id
            "#
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_reservation).collect()
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price, available_quantity, reserved_quantity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                price = EXCLUDED.price,
                updated_at = NOW()
            "#,
        )
        .bind(product.product_id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.available_quantity as i32)
        .bind(product.reserved_quantity as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
