//! Applies order lifecycle events to inventory.

use std::sync::Arc;

use async_trait::async_trait;
use event_bus::{
    EventBus, EventHandler, HandlerError, IntegrationEvent, OrderCancelled, OrderConfirmed, topics,
};
use event_ledger::{EventLedger, IdempotentProcessor, ProcessOutcome};

use crate::{InventoryService, ReservationEngine};

/// Consumer group of the inventory service.
pub const INVENTORY_CONSUMER_GROUP: &str = "inventory-service-group";

/// Ledger name for `orders.confirmed` deliveries.
pub const ORDER_CONFIRMED_CONSUMER: &str = "order-confirmed-consumer";

/// Ledger name for `orders.cancelled` deliveries.
pub const ORDER_CANCELLED_CONSUMER: &str = "order-cancelled-consumer";

/// Commits stock on `OrderConfirmed` and releases it on `OrderCancelled`.
///
/// Both effects go through the idempotent processor, so a redelivered event
/// is skipped instead of applied twice.
pub struct OrderEventsConsumer<E, B, L>
where
    E: ReservationEngine,
    B: EventBus,
    L: EventLedger,
{
    service: InventoryService<E, B>,
    processor: IdempotentProcessor<L>,
}

impl<E, B, L> Clone for OrderEventsConsumer<E, B, L>
where
    E: ReservationEngine,
    B: EventBus,
    L: EventLedger,
{
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            processor: self.processor.clone(),
        }
    }
}

impl<E, B, L> OrderEventsConsumer<E, B, L>
where
    E: ReservationEngine + 'static,
    B: EventBus + 'static,
    L: EventLedger + 'static,
{
    pub fn new(service: InventoryService<E, B>, processor: IdempotentProcessor<L>) -> Self {
        Self { service, processor }
    }

    /// Handles one `orders.confirmed` delivery.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id))]
    pub async fn on_order_confirmed(
        &self,
        event: &IntegrationEvent,
    ) -> Result<ProcessOutcome, HandlerError> {
        let payload: OrderConfirmed = event.decode()?;
        let service = &self.service;
        let order_id = payload.order_id;
        let outcome = self
            .processor
            .process(event.event_id, ORDER_CONFIRMED_CONSUMER, || async move {
                service.commit(order_id).await.map(|_| ())
            })
            .await?;

        if outcome == ProcessOutcome::Skipped {
            tracing::info!(order_id = %payload.order_id, "duplicate OrderConfirmed skipped");
        }
        Ok(outcome)
    }

    /// Handles one `orders.cancelled` delivery.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id))]
    pub async fn on_order_cancelled(
        &self,
        event: &IntegrationEvent,
    ) -> Result<ProcessOutcome, HandlerError> {
        let payload: OrderCancelled = event.decode()?;
        let service = &self.service;
        let order_id = payload.order_id;
        let outcome = self
            .processor
            .process(event.event_id, ORDER_CANCELLED_CONSUMER, || async move {
                service.release(order_id).await.map(|_| ())
            })
            .await?;

        if outcome == ProcessOutcome::Skipped {
            tracing::info!(order_id = %payload.order_id, "duplicate OrderCancelled skipped");
        }
        Ok(outcome)
    }

    /// Subscribes both handlers under [`INVENTORY_CONSUMER_GROUP`].
    pub async fn subscribe<T: EventBus + ?Sized>(&self, bus: &T) -> event_bus::Result<()> {
        bus.subscribe(
            topics::ORDERS_CONFIRMED,
            INVENTORY_CONSUMER_GROUP,
            Arc::new(ConfirmedHandler(self.clone())),
        )
        .await?;
        bus.subscribe(
            topics::ORDERS_CANCELLED,
            INVENTORY_CONSUMER_GROUP,
            Arc::new(CancelledHandler(self.clone())),
        )
        .await?;

        tracing::info!(group = INVENTORY_CONSUMER_GROUP, "order event consumers subscribed");
        Ok(())
    }
}

struct ConfirmedHandler<E: ReservationEngine, B: EventBus, L: EventLedger>(
    OrderEventsConsumer<E, B, L>,
);

#[async_trait]
impl<E, B, L> EventHandler for ConfirmedHandler<E, B, L>
where
    E: ReservationEngine + 'static,
    B: EventBus + 'static,
    L: EventLedger + 'static,
{
    async fn handle(&self, event: IntegrationEvent) -> Result<(), HandlerError> {
        self.0.on_order_confirmed(&event).await.map(|_| ())
    }
}

struct CancelledHandler<E: ReservationEngine, B: EventBus, L: EventLedger>(
    OrderEventsConsumer<E, B, L>,
);

#[async_trait]
impl<E, B, L> EventHandler for CancelledHandler<E, B, L>
where
    E: ReservationEngine + 'static,
    B: EventBus + 'static,
    L: EventLedger + 'static,
{
    async fn handle(&self, event: IntegrationEvent) -> Result<(), HandlerError> {
        self.0.on_order_cancelled(&event).await.map(|_| ())
    }
}
