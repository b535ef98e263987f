//! Saga orchestration for order placement.
//!
//! The `CreateOrder` saga runs two steps against an order:
//! 1. Reserve inventory
//! 2. Confirm the order and announce it
//!
//! Progress is persisted step by step. When a step fails, the steps that
//! succeeded are compensated in reverse order and the saga ends
//! `COMPENSATED`; step failures never surface to the caller as errors.
//!
//! [`OrderPlacement`] is the entry point used by the HTTP surface: it stores
//! a PENDING order and dispatches the saga on a separate task.

pub mod client;
pub mod error;
pub mod instance;
pub mod memory;
pub mod orchestrator;
pub mod placement;
pub mod postgres;
pub mod repository;
pub mod state;
pub mod step;

pub use client::{HttpInventoryClient, InventoryClient, LocalInventoryClient};
pub use error::{ClientError, Result, SagaError, StepError, StepErrorKind};
pub use instance::{SagaContext, SagaInstance, SagaReport, SagaStepExecution};
pub use memory::InMemorySagaRepository;
pub use orchestrator::{DEFAULT_STEP_TIMEOUT, SagaOrchestrator, SagaOutcome};
pub use placement::{DEFAULT_LOOKUP_TIMEOUT, OrderPlacement};
pub use postgres::PostgresSagaRepository;
pub use repository::SagaRepository;
pub use state::{SagaStatus, StepStatus};
pub use step::{CreateOrderStep, SagaServices, SagaStep, SagaType};
