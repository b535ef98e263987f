//! Topic names shared by producers and consumers.

pub const ORDERS_CREATED: &str = "orders.created";
pub const ORDERS_CONFIRMED: &str = "orders.confirmed";
pub const ORDERS_CANCELLED: &str = "orders.cancelled";
pub const INVENTORY_RESERVED: &str = "inventory.reserved";
pub const INVENTORY_RESERVATION_FAILED: &str = "inventory.reservation-failed";
