use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::{OrderError, OrderStatus, Result};

/// A priced order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

impl OrderItem {
    pub fn new(product_id: ProductId, quantity: u32, price: Money) -> Self {
        Self {
            product_id,
            quantity,
            price,
        }
    }

    /// Returns price × quantity.
    pub fn line_total(&self) -> Money {
        self.price * self.quantity
    }
}

/// An order record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a PENDING order; the total is the sum of the line totals.
    pub fn new(user_id: UserId, items: Vec<OrderItem>) -> Self {
        let now = Utc::now();
        let total_amount = items.iter().map(OrderItem::line_total).sum();
        Self {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Pending,
            total_amount,
            items,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the order to `target`, touching `updated_at` only on change.
    pub fn transition_to(&mut self, target: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        if self.status != target {
            self.status = target;
            self.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// Unpriced line in an order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Request to place an order; prices are looked up at placement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub items: Vec<RequestedItem>,
}

impl CreateOrderRequest {
    /// Checks for at least one item, positive quantities and unique products.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(OrderError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if item.quantity < 1 {
                return Err(OrderError::Validation(format!(
                    "quantity for product {} must be at least 1",
                    item.product_id
                )));
            }
            if !seen.insert(item.product_id) {
                return Err(OrderError::Validation(format!(
                    "product {} appears more than once",
                    item.product_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: u32, cents: i64) -> OrderItem {
        OrderItem::new(ProductId::new(), quantity, Money::from_cents(cents))
    }

    #[test]
    fn new_order_is_pending_with_summed_total() {
        let order = Order::new(UserId::new(), vec![item(2, 1000), item(1, 550)]);

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Money::from_cents(2550));
        assert_eq!(order.created_at, order.updated_at);
    }

    #[test]
    fn transition_rejects_cancelled_to_confirmed() {
        let mut order = Order::new(UserId::new(), vec![item(1, 100)]);
        order.transition_to(OrderStatus::Cancelled).unwrap();

        let err = order.transition_to(OrderStatus::Confirmed).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Confirmed
            }
        ));
    }

    #[test]
    fn same_status_is_a_no_op() {
        let mut order = Order::new(UserId::new(), vec![item(1, 100)]);
        order.transition_to(OrderStatus::Confirmed).unwrap();
        let updated_at = order.updated_at;

        order.transition_to(OrderStatus::Confirmed).unwrap();
        assert_eq!(order.updated_at, updated_at);
    }

    #[test]
    fn request_validation() {
        let product_id = ProductId::new();
        let valid = CreateOrderRequest {
            user_id: UserId::new(),
            items: vec![RequestedItem {
                product_id,
                quantity: 1,
            }],
        };
        assert!(valid.validate().is_ok());

        let empty = CreateOrderRequest {
            items: vec![],
            ..valid.clone()
        };
        assert!(matches!(empty.validate(), Err(OrderError::Validation(_))));

        let zero = CreateOrderRequest {
            items: vec![RequestedItem {
                product_id,
                quantity: 0,
            }],
            ..valid.clone()
        };
        assert!(zero.validate().is_err());

        let duplicate = CreateOrderRequest {
            items: vec![valid.items[0].clone(), valid.items[0].clone()],
            ..valid
        };
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn order_serializes_in_camel_case() {
        let order = Order::new(UserId::new(), vec![item(3, 200)]);
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["totalAmount"], 600);
        assert!(json.get("userId").is_some());
        assert_eq!(json["items"][0]["quantity"], 3);
    }
}
