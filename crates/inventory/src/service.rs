//! Inventory service: reservation engine plus event publication.

use std::sync::Arc;

use common::{CorrelationId, OrderId, ProductId};
use event_bus::{EventBus, EventBusExt, InventoryReservationFailed, InventoryReserved};

use crate::{
    InventoryError, InventoryReservation, Product, ProductPage, ReservationEngine,
    ReservationResult, ReserveRequest, Result, SettleOutcome,
};

/// Wraps a [`ReservationEngine`] and announces reservation outcomes on the bus.
///
/// A successful reserve publishes `InventoryReserved`; a stock shortfall
/// publishes `InventoryReservationFailed` before returning the rejection.
pub struct InventoryService<E: ReservationEngine, B: EventBus> {
    engine: Arc<E>,
    bus: Arc<B>,
}

impl<E: ReservationEngine, B: EventBus> Clone for InventoryService<E, B> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            bus: Arc::clone(&self.bus),
        }
    }
}

impl<E: ReservationEngine, B: EventBus> InventoryService<E, B> {
    /// Creates a new inventory service.
    pub fn new(engine: Arc<E>, bus: Arc<B>) -> Self {
        Self { engine, bus }
    }

    /// Gets a reference to the engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Reserves stock for an order.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn reserve(
        &self,
        request: &ReserveRequest,
        correlation_id: Option<CorrelationId>,
    ) -> Result<ReservationResult> {
        tracing::info!(items = request.items.len(), "reserving inventory");

        match self.engine.reserve(request).await {
            Ok(result) => {
                metrics::counter!("inventory_reservations_total").increment(1);
                tracing::info!(
                    reservation_id = %result.reservation_id,
                    expires_at = %result.expires_at,
                    "inventory reserved"
                );

                let event = InventoryReserved {
                    order_id: result.order_id,
                    reservation_id: result.reservation_id,
                    items: result.items.iter().cloned().map(Into::into).collect(),
                };
                if let Err(e) = self.bus.publish_payload(&event, correlation_id).await {
                    tracing::error!(error = %e, "failed to publish InventoryReserved");
                }

                Ok(result)
            }
            Err(InventoryError::InsufficientStock(unavailable)) => {
                metrics::counter!("inventory_reservations_rejected").increment(1);
                tracing::warn!(
                    unavailable = unavailable.len(),
                    "reservation rejected for insufficient stock"
                );

                let event = InventoryReservationFailed {
                    order_id: request.order_id,
                    reason: "Insufficient stock".to_string(),
                    unavailable_products: unavailable.iter().cloned().map(Into::into).collect(),
                };
                if let Err(e) = self.bus.publish_payload(&event, correlation_id).await {
                    tracing::error!(error = %e, "failed to publish InventoryReservationFailed");
                }

                Err(InventoryError::InsufficientStock(unavailable))
            }
            Err(e) => Err(e),
        }
    }

    /// Releases every `RESERVED` row of an order.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, order_id: OrderId) -> Result<SettleOutcome> {
        let outcome = self.engine.release(order_id).await?;
        if outcome.is_noop() {
            tracing::warn!("no reservations to release");
        } else {
            tracing::info!(reservations = outcome.reservations, "inventory released");
        }
        Ok(outcome)
    }

    /// Commits every `RESERVED` row of an order.
    #[tracing::instrument(skip(self))]
    pub async fn commit(&self, order_id: OrderId) -> Result<SettleOutcome> {
        let outcome = self.engine.commit(order_id).await?;
        if outcome.is_noop() {
            tracing::warn!("no reservations to commit");
        } else {
            tracing::info!(reservations = outcome.reservations, "inventory committed");
        }
        Ok(outcome)
    }

    /// Releases all reservations that have expired by now.
    #[tracing::instrument(skip(self))]
    pub async fn release_expired(&self) -> Result<Vec<InventoryReservation>> {
        let released = self.engine.expire().await?;
        if !released.is_empty() {
            metrics::counter!("inventory_reservations_expired").increment(released.len() as u64);
            tracing::info!(count = released.len(), "expired reservations released");
        }
        Ok(released)
    }

    pub async fn product(&self, product_id: ProductId) -> Result<Product> {
        self.engine.product(product_id).await
    }

    pub async fn products(&self, page: u32, limit: u32) -> Result<ProductPage> {
        self.engine.products(page, limit).await
    }

    pub async fn reservations_for(&self, order_id: OrderId) -> Result<Vec<InventoryReservation>> {
        self.engine.reservations_for(order_id).await
    }
}
