//! Step model and the `CreateOrder` steps.

use std::sync::Arc;

use async_trait::async_trait;
use event_bus::{EventBus, EventBusExt, OrderCancelled, OrderConfirmed};
use inventory::{ReserveItem, ReserveRequest};
use orders::{OrderRepository, OrderStatus};

use crate::instance::keys;
use crate::{InventoryClient, SagaContext, StepError, StepErrorKind};

/// Reason carried by `OrderCancelled` when a saga compensates.
pub const COMPENSATION_REASON: &str = "Saga compensation";

/// One step of a saga: a forward action and its compensation over a shared
/// context.
///
/// `execute` returns the keys to merge into the context.
#[async_trait]
pub trait SagaStep<S: Sync>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, services: &S, ctx: &SagaContext) -> Result<SagaContext, StepError>;

    async fn compensate(&self, services: &S, ctx: &SagaContext) -> Result<(), StepError>;

    /// Whether a failed attempt is compensated too.
    ///
    /// True when the action may have taken effect despite `error`: it has
    /// several effects and stopped halfway, or its outcome was lost.
    fn compensate_on_failure(&self, error: &StepError) -> bool {
        let _ = error;
        false
    }
}

/// Collaborators the `CreateOrder` steps act on.
pub struct SagaServices<I, R, B> {
    pub inventory: Arc<I>,
    pub orders: Arc<R>,
    pub bus: Arc<B>,
}

impl<I, R, B> SagaServices<I, R, B> {
    pub fn new(inventory: Arc<I>, orders: Arc<R>, bus: Arc<B>) -> Self {
        Self {
            inventory,
            orders,
            bus,
        }
    }
}

impl<I, R, B> Clone for SagaServices<I, R, B> {
    fn clone(&self) -> Self {
        Self {
            inventory: Arc::clone(&self.inventory),
            orders: Arc::clone(&self.orders),
            bus: Arc::clone(&self.bus),
        }
    }
}

/// Saga types known to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaType {
    CreateOrder,
}

impl SagaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaType::CreateOrder => "CreateOrder",
        }
    }

    /// Steps of this saga in execution order.
    pub fn steps(&self) -> &'static [CreateOrderStep] {
        match self {
            SagaType::CreateOrder => CreateOrderStep::ALL,
        }
    }
}

impl std::fmt::Display for SagaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Steps of the `CreateOrder` saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateOrderStep {
    /// Reserves stock for every line; compensation releases the order.
    ReserveInventory,
    /// Confirms the order and announces it; compensation cancels it.
    ConfirmOrder,
}

impl CreateOrderStep {
    pub const ALL: &'static [CreateOrderStep] =
        &[CreateOrderStep::ReserveInventory, CreateOrderStep::ConfirmOrder];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CreateOrderStep::ReserveInventory => "reserve-inventory",
            CreateOrderStep::ConfirmOrder => "confirm-order",
        }
    }
}

#[async_trait]
impl<I, R, B> SagaStep<SagaServices<I, R, B>> for CreateOrderStep
where
    I: InventoryClient + 'static,
    R: OrderRepository + 'static,
    B: EventBus + 'static,
{
    fn name(&self) -> &'static str {
        self.as_str()
    }

    async fn execute(
        &self,
        services: &SagaServices<I, R, B>,
        ctx: &SagaContext,
    ) -> Result<SagaContext, StepError> {
        let order_id = ctx.order_id()?;
        let correlation_id = ctx.correlation_id();
        let mut additions = SagaContext::new();

        match self {
            CreateOrderStep::ReserveInventory => {
                let items = ctx
                    .items()?
                    .into_iter()
                    .map(|item| ReserveItem::new(item.product_id, item.quantity))
                    .collect();
                let result = services
                    .inventory
                    .reserve(&ReserveRequest::new(order_id, items), correlation_id)
                    .await?;

                additions.insert(keys::RESERVATION_ID, result.reservation_id)?;
                additions.insert(keys::EXPIRES_AT, result.expires_at)?;
            }
            CreateOrderStep::ConfirmOrder => {
                let total_amount = ctx.total_amount()?;
                services
                    .orders
                    .update_status(order_id, OrderStatus::Confirmed)
                    .await?;
                services
                    .bus
                    .publish_payload(
                        &OrderConfirmed {
                            order_id,
                            total_amount,
                        },
                        correlation_id,
                    )
                    .await?;

                additions.insert(keys::CONFIRMED, true)?;
            }
        }

        Ok(additions)
    }

    async fn compensate(
        &self,
        services: &SagaServices<I, R, B>,
        ctx: &SagaContext,
    ) -> Result<(), StepError> {
        let order_id = ctx.order_id()?;
        let correlation_id = ctx.correlation_id();

        match self {
            CreateOrderStep::ReserveInventory => {
                services.inventory.release(order_id, correlation_id).await?;
            }
            CreateOrderStep::ConfirmOrder => {
                services
                    .orders
                    .update_status(order_id, OrderStatus::Cancelled)
                    .await?;
                services
                    .bus
                    .publish_payload(
                        &OrderCancelled {
                            order_id,
                            reason: COMPENSATION_REASON.to_string(),
                        },
                        correlation_id,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    fn compensate_on_failure(&self, error: &StepError) -> bool {
        match self {
            // A timed out or dropped call may still have reserved remotely;
            // release is a no-op otherwise.
            CreateOrderStep::ReserveInventory => matches!(
                error.kind(),
                StepErrorKind::Timeout | StepErrorKind::Transient
            ),
            // The status write may land before the publish fails.
            CreateOrderStep::ConfirmOrder => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_order_steps_in_order() {
        let names: Vec<&str> = SagaType::CreateOrder
            .steps()
            .iter()
            .map(|s| s.as_str())
            .collect();
        assert_eq!(names, vec!["reserve-inventory", "confirm-order"]);
    }

    #[test]
    fn step_from_name() {
        assert_eq!(
            CreateOrderStep::from_name("confirm-order"),
            Some(CreateOrderStep::ConfirmOrder)
        );
        assert_eq!(CreateOrderStep::from_name("ship-order"), None);
    }

    type Services = SagaServices<
        crate::LocalInventoryClient<inventory::InMemoryReservationEngine, event_bus::InMemoryEventBus>,
        orders::InMemoryOrderRepository,
        event_bus::InMemoryEventBus,
    >;

    fn compensates_itself(step: CreateOrderStep, error: &StepError) -> bool {
        <CreateOrderStep as SagaStep<Services>>::compensate_on_failure(&step, error)
    }

    #[test]
    fn reserve_compensates_itself_only_when_outcome_is_unknown() {
        let reserve = CreateOrderStep::ReserveInventory;
        assert!(compensates_itself(
            reserve,
            &StepError::timeout(std::time::Duration::from_secs(10))
        ));
        assert!(compensates_itself(reserve, &StepError::transient("HTTP 503")));
        assert!(!compensates_itself(reserve, &StepError::rejected("Insufficient stock")));
        assert!(!compensates_itself(reserve, &StepError::validation("no items")));

        assert!(compensates_itself(
            CreateOrderStep::ConfirmOrder,
            &StepError::rejected("Invalid transition")
        ));
    }

    #[test]
    fn saga_type_name() {
        assert_eq!(SagaType::CreateOrder.to_string(), "CreateOrder");
    }
}
