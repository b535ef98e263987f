//! Inventory reservation engine.
//!
//! Holds product stock counters and reservation rows. A reservation debits
//! `available` and credits `reserved`; commit removes the reserved stock
//! (sold) and release returns it. Reservations left `RESERVED` past their
//! expiry are released by the [`ExpirySweeper`].

pub mod consumer;
pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod service;
pub mod sweeper;

pub use consumer::{
    INVENTORY_CONSUMER_GROUP, ORDER_CANCELLED_CONSUMER, ORDER_CONFIRMED_CONSUMER,
    OrderEventsConsumer,
};
pub use engine::{DEFAULT_RESERVATION_TTL_SECS, ReservationEngine};
pub use error::{InventoryError, Result};
pub use memory::InMemoryReservationEngine;
pub use model::{
    InventoryReservation, Product, ProductPage, ReservationResult, ReservationStatus, ReserveItem,
    ReserveRequest, SettleOutcome, UnavailableProduct,
};
pub use postgres::PostgresReservationEngine;
pub use service::InventoryService;
pub use sweeper::ExpirySweeper;
