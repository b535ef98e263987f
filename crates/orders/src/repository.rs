use async_trait::async_trait;
use common::{OrderId, UserId};

use crate::{Order, OrderStatus, Result};

/// Persistence for order records.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a new order.
    async fn create(&self, order: &Order) -> Result<()>;

    /// Loads an order by id.
    async fn find_one(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Moves an order to `status` and returns the stored record.
    ///
    /// Fails with `NotFound` for unknown orders and `InvalidTransition` for
    /// disallowed moves. Setting the current status again succeeds unchanged.
    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order>;

    /// Lists a user's orders, newest first.
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;
}
