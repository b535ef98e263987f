//! Order record and persistence.
//!
//! Orders are thin records: the saga orchestrator reads them and moves their
//! status between `PENDING`, `CONFIRMED` and `CANCELLED`.

pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod repository;
pub mod state;

pub use error::{OrderError, Result};
pub use memory::InMemoryOrderRepository;
pub use order::{CreateOrderRequest, Order, OrderItem, RequestedItem};
pub use postgres::PostgresOrderRepository;
pub use repository::OrderRepository;
pub use state::OrderStatus;
