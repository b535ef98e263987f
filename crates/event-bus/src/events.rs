//! Wire payloads of the integration events.

use common::{Money, OrderId, ProductId, ReservationId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::topics;

/// A typed payload that knows its event type tag, topic and aggregate.
pub trait EventPayload: Serialize {
    /// Value of the envelope's `eventType` field.
    const EVENT_TYPE: &'static str;

    /// Topic the payload is published on.
    const TOPIC: &'static str;

    /// Aggregate the event belongs to; used as the partition key.
    fn aggregate_id(&self) -> Uuid;
}

/// Order line as carried by `OrderCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLineItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

/// Product and quantity pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// One product that could not be reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortfallItem {
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub items: Vec<EventLineItem>,
    pub total_amount: Money,
}

impl EventPayload for OrderCreated {
    const EVENT_TYPE: &'static str = "OrderCreated";
    const TOPIC: &'static str = topics::ORDERS_CREATED;

    fn aggregate_id(&self) -> Uuid {
        self.order_id.as_uuid()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmed {
    pub order_id: OrderId,
    pub total_amount: Money,
}

impl EventPayload for OrderConfirmed {
    const EVENT_TYPE: &'static str = "OrderConfirmed";
    const TOPIC: &'static str = topics::ORDERS_CONFIRMED;

    fn aggregate_id(&self) -> Uuid {
        self.order_id.as_uuid()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub reason: String,
}

impl EventPayload for OrderCancelled {
    const EVENT_TYPE: &'static str = "OrderCancelled";
    const TOPIC: &'static str = topics::ORDERS_CANCELLED;

    fn aggregate_id(&self) -> Uuid {
        self.order_id.as_uuid()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReserved {
    pub order_id: OrderId,
    pub reservation_id: ReservationId,
    pub items: Vec<EventItem>,
}

impl EventPayload for InventoryReserved {
    const EVENT_TYPE: &'static str = "InventoryReserved";
    const TOPIC: &'static str = topics::INVENTORY_RESERVED;

    fn aggregate_id(&self) -> Uuid {
        self.order_id.as_uuid()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReservationFailed {
    pub order_id: OrderId,
    pub reason: String,
    pub unavailable_products: Vec<ShortfallItem>,
}

impl EventPayload for InventoryReservationFailed {
    const EVENT_TYPE: &'static str = "InventoryReservationFailed";
    const TOPIC: &'static str = topics::INVENTORY_RESERVATION_FAILED;

    fn aggregate_id(&self) -> Uuid {
        self.order_id.as_uuid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_created_wire_shape() {
        let payload = OrderCreated {
            order_id: OrderId::new(),
            user_id: UserId::new(),
            items: vec![EventLineItem {
                product_id: ProductId::new(),
                quantity: 2,
                price: Money::from_cents(1999),
            }],
            total_amount: Money::from_cents(3998),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("orderId").is_some());
        assert!(json.get("userId").is_some());
        assert_eq!(json["totalAmount"], 3998);
        assert_eq!(json["items"][0]["quantity"], 2);
        assert_eq!(json["items"][0]["price"], 1999);
    }

    #[test]
    fn reservation_failed_lists_unavailable_products() {
        let product_id = ProductId::new();
        let payload = InventoryReservationFailed {
            order_id: OrderId::new(),
            reason: "Insufficient stock".to_string(),
            unavailable_products: vec![ShortfallItem {
                product_id,
                requested: 5,
                available: 1,
            }],
        };

        let json = serde_json::to_value(&payload).unwrap();
        let entry = &json["unavailableProducts"][0];
        assert_eq!(entry["productId"], product_id.to_string());
        assert_eq!(entry["requested"], 5);
        assert_eq!(entry["available"], 1);
    }

    #[test]
    fn payloads_route_to_their_topics() {
        assert_eq!(OrderCreated::TOPIC, "orders.created");
        assert_eq!(OrderConfirmed::TOPIC, "orders.confirmed");
        assert_eq!(OrderCancelled::TOPIC, "orders.cancelled");
        assert_eq!(InventoryReserved::TOPIC, "inventory.reserved");
        assert_eq!(
            InventoryReservationFailed::TOPIC,
            "inventory.reservation-failed"
        );
    }
}
