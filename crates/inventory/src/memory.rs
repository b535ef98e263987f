use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ProductId, ReservationId};
use tokio::sync::Mutex;

use crate::engine::DEFAULT_RESERVATION_TTL_SECS;
use crate::model::validate_paging;
use crate::{
    InventoryError, InventoryReservation, Product, ProductPage, ReservationEngine,
    ReservationResult, ReservationStatus, ReserveRequest, Result, SettleOutcome,
    UnavailableProduct,
};

#[derive(Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    reservations: Vec<InventoryReservation>,
}

impl State {
    fn product_mut(&mut self, product_id: ProductId) -> Result<&mut Product> {
        self.products
            .get_mut(&product_id)
            .ok_or(InventoryError::ProductNotFound(product_id))
    }

    fn order_rows(&self, order_id: OrderId) -> Vec<InventoryReservation> {
        self.reservations
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Moves one `RESERVED` row to `target` and adjusts its product counters.
    fn settle(&mut self, index: usize, target: ReservationStatus) -> Result<()> {
        let (product_id, quantity) = {
            let row = &self.reservations[index];
            (row.product_id, row.quantity)
        };

        let product = self.product_mut(product_id)?;
        product.reserved_quantity -= quantity;
        if target == ReservationStatus::Released {
            product.available_quantity += quantity;
        }

        self.reservations[index].status = target;
        Ok(())
    }

    fn settle_order(&mut self, order_id: OrderId, target: ReservationStatus) -> Result<usize> {
        let indexes: Vec<usize> = self
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.order_id == order_id && r.status == ReservationStatus::Reserved)
            .map(|(i, _)| i)
            .collect();

        for &index in &indexes {
            self.settle(index, target)?;
        }
        Ok(indexes.len())
    }
}

/// In-memory reservation engine.
///
/// One mutex guards products and reservations together, so every
/// operation is a single critical section.
#[derive(Clone)]
pub struct InMemoryReservationEngine {
    state: Arc<Mutex<State>>,
    ttl: Duration,
}

impl Default for InMemoryReservationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryReservationEngine {
    /// Creates an empty engine with the default reservation TTL.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            ttl: Duration::seconds(DEFAULT_RESERVATION_TTL_SECS),
        }
    }

    /// Sets the reservation TTL. Clones share state but keep their own TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Creates an engine seeded with products.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let engine = Self::new();
        {
            let mut state = engine.state.lock().await;
            for product in products {
                state.products.insert(product.product_id, product);
            }
        }
        engine
    }
}

#[async_trait]
impl ReservationEngine for InMemoryReservationEngine {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn reserve(&self, request: &ReserveRequest) -> Result<ReservationResult> {
        request.validate()?;
        let mut state = self.state.lock().await;

        let existing = state.order_rows(request.order_id);
        if let Some(result) = ReservationResult::from_existing(request.order_id, &existing)? {
            tracing::info!("order already holds a reservation, returning it");
            return Ok(result);
        }

        let mut unavailable = Vec::new();
        for item in &request.items {
            let product = state
                .products
                .get(&item.product_id)
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

        let now = Utc::now();
        let expires_at = now + self.ttl;
        let mut rows = Vec::with_capacity(request.items.len());

        for item in &request.items {
            let product = state.product_mut(item.product_id)?;
            product.available_quantity -= item.quantity;
            product.reserved_quantity += item.quantity;

            rows.push(InventoryReservation {
                reservation_id: ReservationId::new(),
                order_id: request.order_id,
                product_id: item.product_id,
                quantity: item.quantity,
                status: ReservationStatus::Reserved,
                expires_at,
                created_at: now,
            });
        }

        state.reservations.extend(rows.iter().cloned());

        ReservationResult::from_rows(request.order_id, &rows)
            .ok_or_else(|| InventoryError::Validation("at least one item is required".to_string()))
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, order_id: OrderId) -> Result<SettleOutcome> {
        let mut state = self.state.lock().await;
        let reservations = state.settle_order(order_id, ReservationStatus::Released)?;
        Ok(SettleOutcome {
            order_id,
            reservations,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&self, order_id: OrderId) -> Result<SettleOutcome> {
        let mut state = self.state.lock().await;
        let reservations = state.settle_order(order_id, ReservationStatus::Committed)?;
        Ok(SettleOutcome {
            order_id,
            reservations,
        })
    }

    async fn expire_at(&self, now: DateTime<Utc>) -> Result<Vec<InventoryReservation>> {
        let mut state = self.state.lock().await;

        let expired: Vec<usize> = state
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ReservationStatus::Reserved && r.expires_at < now)
            .map(|(i, _)| i)
            .collect();

        let mut released = Vec::with_capacity(expired.len());
        for index in expired {
            state.settle(index, ReservationStatus::Released)?;
            let row = state.reservations[index].clone();
            tracing::info!(
                reservation_id = %row.reservation_id,
                order_id = %row.order_id,
                "released expired reservation"
            );
            released.push(row);
        }
        Ok(released)
    }

    async fn product(&self, product_id: ProductId) -> Result<Product> {
        let state = self.state.lock().await;
        state
            .products
            .get(&product_id)
            .cloned()
            .ok_or(InventoryError::ProductNotFound(product_id))
    }

    async fn products(&self, page: u32, limit: u32) -> Result<ProductPage> {
        validate_paging(page, limit)?;
        let state = self.state.lock().await;

        let skip = (page as usize - 1).saturating_mul(limit as usize);
        let products = state
            .products
            .values()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok(ProductPage::new(
            products,
            state.products.len() as u64,
            page,
            limit,
        ))
    }

    async fn reservations_for(&self, order_id: OrderId) -> Result<Vec<InventoryReservation>> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.products.get_mut(&product.product_id) {
            Some(stored) => {
                stored.name = product.name.clone();
                stored.price = product.price;
            }
            None => {
                state.products.insert(product.product_id, product.clone());
            }
        }
        Ok(())
    }
}
