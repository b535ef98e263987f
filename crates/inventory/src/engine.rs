use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};

use crate::{
    InventoryReservation, Product, ProductPage, ReservationResult, ReserveRequest, Result,
    SettleOutcome,
};

/// How long a reservation stays `RESERVED` before the sweeper releases it.
pub const DEFAULT_RESERVATION_TTL_SECS: i64 = 15 * 60;

/// Stock counters and reservation rows.
///
/// Every operation is one atomic unit: no other operation on the same
/// products observes a half-applied reserve, release, commit or expiry.
#[async_trait]
pub trait ReservationEngine: Send + Sync {
    /// Reserves every item of the request, or none of them.
    ///
    /// All items are checked before anything is debited. A stock shortfall
    /// fails with `InsufficientStock` listing every short item; an unknown
    /// product fails with `ProductNotFound`. If the order already holds
    /// `RESERVED` rows they are returned unchanged.
    async fn reserve(&self, request: &ReserveRequest) -> Result<ReservationResult>;

    /// Returns every `RESERVED` row of the order to available stock.
    async fn release(&self, order_id: OrderId) -> Result<SettleOutcome>;

    /// Removes every `RESERVED` row of the order from stock (sold).
    async fn commit(&self, order_id: OrderId) -> Result<SettleOutcome>;

    /// Releases each `RESERVED` row whose `expires_at` is before `now`.
    ///
    /// Returns the released rows.
    async fn expire_at(&self, now: DateTime<Utc>) -> Result<Vec<InventoryReservation>>;

    /// Releases every reservation that has expired by now.
    async fn expire(&self) -> Result<Vec<InventoryReservation>> {
        self.expire_at(Utc::now()).await
    }

    /// Loads a product by id.
    async fn product(&self, product_id: ProductId) -> Result<Product>;

    /// Lists products, `page` starting at 1.
    async fn products(&self, page: u32, limit: u32) -> Result<ProductPage>;

    /// Lists every reservation row of an order, in creation order.
    async fn reservations_for(&self, order_id: OrderId) -> Result<Vec<InventoryReservation>>;

    /// Inserts a product, or updates the name and price of a stored one.
    ///
    /// Stock counters of a stored product are left alone; they only move
    /// through reservations.
    async fn upsert_product(&self, product: &Product) -> Result<()>;
}
