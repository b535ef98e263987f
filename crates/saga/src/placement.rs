//! Order placement: price, persist, announce, then hand off to the saga.

use std::time::Duration;

use common::CorrelationId;
use event_bus::{EventBus, EventBusExt, EventLineItem, OrderCreated};
use orders::{CreateOrderRequest, Order, OrderItem, OrderRepository};
use tracing::Instrument;

use crate::{InventoryClient, Result, SagaError, SagaOrchestrator, SagaRepository, SagaType};

/// Default timeout of each product price lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts order requests and dispatches the `CreateOrder` saga.
///
/// `place` returns the PENDING order as soon as it is stored; the saga runs
/// on its own task and its outcome is only visible through the order status
/// and the events it publishes.
pub struct OrderPlacement<S, I, R, B>
where
    S: SagaRepository,
    I: InventoryClient,
    R: OrderRepository,
    B: EventBus,
{
    orchestrator: SagaOrchestrator<S, I, R, B>,
    lookup_timeout: Duration,
}

impl<S, I, R, B> Clone for OrderPlacement<S, I, R, B>
where
    S: SagaRepository,
    I: InventoryClient,
    R: OrderRepository,
    B: EventBus,
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            lookup_timeout: self.lookup_timeout,
        }
    }
}

impl<S, I, R, B> OrderPlacement<S, I, R, B>
where
    S: SagaRepository + 'static,
    I: InventoryClient + 'static,
    R: OrderRepository + 'static,
    B: EventBus + 'static,
{
    pub fn new(orchestrator: SagaOrchestrator<S, I, R, B>) -> Self {
        Self {
            orchestrator,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    pub fn orchestrator(&self) -> &SagaOrchestrator<S, I, R, B> {
        &self.orchestrator
    }

    /// Prices the request's lines from the inventory catalogue.
    async fn price(&self, request: &CreateOrderRequest) -> Result<Vec<OrderItem>> {
        let inventory = &self.orchestrator.services().inventory;
        let mut items = Vec::with_capacity(request.items.len());

        for line in &request.items {
            let product =
                tokio::time::timeout(self.lookup_timeout, inventory.product(line.product_id))
                    .await
                    .map_err(|_| SagaError::LookupTimeout(self.lookup_timeout))??;
            items.push(OrderItem::new(line.product_id, line.quantity, product.price));
        }

        Ok(items)
    }

    /// Places an order and starts its saga in the background.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn place(&self, request: &CreateOrderRequest) -> Result<Order> {
        request.validate()?;

        let items = self.price(request).await?;
        let order = Order::new(request.user_id, items);

        let services = self.orchestrator.services();
        services.orders.create(&order).await?;
        metrics::counter!("orders_created").increment(1);

        let correlation_id = CorrelationId::new();
        let created = OrderCreated {
            order_id: order.id,
            user_id: order.user_id,
            items: order
                .items
                .iter()
                .map(|item| EventLineItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            total_amount: order.total_amount,
        };
        if let Err(e) = services
            .bus
            .publish_payload(&created, Some(correlation_id))
            .await
        {
            tracing::warn!(order_id = %order.id, error = %e, "failed to publish OrderCreated");
        }

        tracing::info!(
            order_id = %order.id,
            total_amount = order.total_amount.cents(),
            "order placed, dispatching saga"
        );
        self.dispatch(order.clone(), correlation_id);

        Ok(order)
    }

    fn dispatch(&self, order: Order, correlation_id: CorrelationId) {
        let orchestrator = self.orchestrator.clone();
        let span = tracing::info_span!("saga_dispatch", order_id = %order.id);

        tokio::spawn(
            async move {
                if let Err(e) = orchestrator
                    .execute_correlated(SagaType::CreateOrder, &order, correlation_id)
                    .await
                {
                    metrics::counter!("saga_dispatch_failures").increment(1);
                    tracing::error!(error = %e, "saga execution failed");
                }
            }
            .instrument(span),
        );
    }
}
