use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use crate::{Order, OrderError, OrderRepository, OrderStatus, Result};

/// In-memory order repository for testing and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Returns true if no orders are stored.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_one(&self, order_id: OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&order_id).cloned())
    }

    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound(order_id))?;

        order.transition_to(status)?;
        Ok(order.clone())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}
