//! Event bus abstraction for integration events.
//!
//! Producers publish [`IntegrationEvent`]s to named topics; consumer groups
//! subscribe with an [`EventHandler`]. Delivery is at-least-once, so handlers
//! are expected to deduplicate through the event ledger.

pub mod bus;
pub mod envelope;
pub mod error;
pub mod events;
pub mod memory;
pub mod topics;

pub use bus::{EventBus, EventBusExt, EventHandler, HandlerError};
pub use envelope::{IntegrationEvent, IntegrationEventBuilder};
pub use error::{BusError, Result};
pub use events::{
    EventItem, EventLineItem, EventPayload, InventoryReservationFailed, InventoryReserved,
    OrderCancelled, OrderConfirmed, OrderCreated, ShortfallItem,
};
pub use memory::InMemoryEventBus;
