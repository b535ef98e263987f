//! Shared identifiers and value types.
//!
//! Every service in the workspace speaks in terms of these types, so they live
//! in a leaf crate with no runtime dependencies beyond `serde` and `uuid`.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{CorrelationId, EventId, OrderId, ProductId, ReservationId, SagaId, UserId};
