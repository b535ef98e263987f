use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, ReservationId};
use event_bus::{EventItem, ShortfallItem};
use serde::{Deserialize, Serialize};

use crate::{InventoryError, Result};

/// Largest quantity accepted per line; matches the `INTEGER` stock columns.
pub const MAX_ITEM_QUANTITY: u32 = i32::MAX as u32;

/// A product and its stock counters.
///
/// `available_quantity + reserved_quantity` is the total stock on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub available_quantity: u32,
    pub reserved_quantity: u32,
}

impl Product {
    /// Creates a product with nothing reserved.
    pub fn new(name: impl Into<String>, price: Money, available_quantity: u32) -> Self {
        Self {
            product_id: ProductId::new(),
            name: name.into(),
            price,
            available_quantity,
            reserved_quantity: 0,
        }
    }

    /// Returns available + reserved.
    pub fn total_stock(&self) -> u64 {
        u64::from(self.available_quantity) + u64::from(self.reserved_quantity)
    }
}

/// Lifecycle of a reservation row.
///
/// ```text
/// RESERVED ──┬──► COMMITTED
///            └──► RELEASED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Reserved,
    Committed,
    Released,
}

impl ReservationStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Reserved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "RESERVED",
            ReservationStatus::Committed => "COMMITTED",
            ReservationStatus::Released => "RELEASED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "RESERVED" => Ok(ReservationStatus::Reserved),
            "COMMITTED" => Ok(ReservationStatus::Committed),
            "RELEASED" => Ok(ReservationStatus::Released),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

/// One reservation row: a hold of `quantity` units of one product for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReservation {
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Product and quantity to reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl ReserveItem {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

impl From<ReserveItem> for EventItem {
    fn from(item: ReserveItem) -> Self {
        EventItem {
            product_id: item.product_id,
            quantity: item.quantity,
        }
    }
}

/// Request to reserve stock for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub order_id: OrderId,
    pub items: Vec<ReserveItem>,
}

impl ReserveRequest {
    pub fn new(order_id: OrderId, items: Vec<ReserveItem>) -> Self {
        Self { order_id, items }
    }

    /// Checks for a non-empty item list, quantities in range and no
    /// repeated product.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(InventoryError::Validation(
                "at least one item is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if item.quantity < 1 || item.quantity > MAX_ITEM_QUANTITY {
                return Err(InventoryError::Validation(format!(
                    "quantity for product {} must be between 1 and {}",
                    item.product_id, MAX_ITEM_QUANTITY
                )));
            }
            if !seen.insert(item.product_id) {
                return Err(InventoryError::Validation(format!(
                    "product {} appears more than once",
                    item.product_id
                )));
            }
        }
        Ok(())
    }
}

/// Successful reservation.
///
/// `reservation_id` is the id of the first row created; every row of the
/// order shares `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResult {
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub expires_at: DateTime<Utc>,
    pub items: Vec<ReserveItem>,
}

impl ReservationResult {
    /// Builds the result from the rows of one order, in creation order.
    pub(crate) fn from_rows(order_id: OrderId, rows: &[InventoryReservation]) -> Option<Self> {
        let first = rows.first()?;
        Some(Self {
            reservation_id: first.reservation_id,
            order_id,
            expires_at: first.expires_at,
            items: rows
                .iter()
                .map(|r| ReserveItem::new(r.product_id, r.quantity))
                .collect(),
        })
    }

    /// Resolves a repeated reserve against every row the order already has.
    ///
    /// Open rows are returned as the existing reservation. Rows that were all
    /// committed or released make the order ineligible for a new hold.
    pub(crate) fn from_existing(
        order_id: OrderId,
        rows: &[InventoryReservation],
    ) -> crate::Result<Option<Self>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let open: Vec<InventoryReservation> = rows
            .iter()
            .filter(|r| r.status == ReservationStatus::Reserved)
            .cloned()
            .collect();
        match Self::from_rows(order_id, &open) {
            Some(result) => Ok(Some(result)),
            None => Err(crate::InventoryError::AlreadySettled(order_id)),
        }
    }
}

/// An item that could not be reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableProduct {
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
}

impl From<UnavailableProduct> for ShortfallItem {
    fn from(p: UnavailableProduct) -> Self {
        ShortfallItem {
            product_id: p.product_id,
            requested: p.requested,
            available: p.available,
        }
    }
}

/// Result of a release or commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleOutcome {
    pub order_id: OrderId,
    /// Rows moved out of `RESERVED` by this call.
    pub reservations: usize,
}

impl SettleOutcome {
    /// Returns true if the order had no `RESERVED` rows.
    pub fn is_noop(&self) -> bool {
        self.reservations == 0
    }
}

/// A page of the product catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u64,
}

impl ProductPage {
    pub(crate) fn new(products: Vec<Product>, total: u64, page: u32, limit: u32) -> Self {
        Self {
            products,
            total,
            page,
            total_pages: total.div_ceil(u64::from(limit)),
        }
    }
}

/// Checks catalogue paging arguments.
pub(crate) fn validate_paging(page: u32, limit: u32) -> Result<()> {
    if page < 1 || limit < 1 {
        return Err(InventoryError::Validation(
            "page and limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}
