//! Persisted saga records and the context carried between steps.

use chrono::{DateTime, Utc};
use common::{CorrelationId, Money, OrderId, SagaId, UserId};
use orders::{Order, OrderItem};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{SagaStatus, StepError, StepStatus};

/// Context keys written by the orchestrator and the `CreateOrder` steps.
pub mod keys {
    pub const ORDER_ID: &str = "orderId";
    pub const USER_ID: &str = "userId";
    pub const ITEMS: &str = "items";
    pub const TOTAL_AMOUNT: &str = "totalAmount";
    pub const CORRELATION_ID: &str = "correlationId";
    pub const RESERVATION_ID: &str = "reservationId";
    pub const EXPIRES_AT: &str = "expiresAt";
    pub const CONFIRMED: &str = "confirmed";
}

/// JSON object shared by the steps of one saga.
///
/// Starts with the order snapshot and the correlation id; each successful
/// step merges its results in. Keys are only added or overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaContext(Map<String, Value>);

impl SagaContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the initial context for an order.
    pub fn for_order(
        order: &Order,
        correlation_id: CorrelationId,
    ) -> Result<Self, serde_json::Error> {
        let mut ctx = Self::new();
        ctx.insert(keys::ORDER_ID, order.id)?;
        ctx.insert(keys::USER_ID, order.user_id)?;
        ctx.insert(keys::ITEMS, &order.items)?;
        ctx.insert(keys::TOTAL_AMOUNT, order.total_amount)?;
        ctx.insert(keys::CORRELATION_ID, correlation_id)?;
        Ok(ctx)
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Serialize,
    ) -> Result<(), serde_json::Error> {
        self.0.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Adds every key of `other`, overwriting on collision.
    pub fn merge(&mut self, other: SagaContext) {
        self.0.extend(other.0);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Reads and decodes a key a step depends on.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, StepError> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| StepError::validation(format!("saga context is missing '{key}'")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| StepError::validation(format!("saga context key '{key}': {e}")))
    }

    pub fn order_id(&self) -> Result<OrderId, StepError> {
        self.require(keys::ORDER_ID)
    }

    pub fn user_id(&self) -> Result<UserId, StepError> {
        self.require(keys::USER_ID)
    }

    pub fn items(&self) -> Result<Vec<OrderItem>, StepError> {
        self.require(keys::ITEMS)
    }

    pub fn total_amount(&self) -> Result<Money, StepError> {
        self.require(keys::TOTAL_AMOUNT)
    }

    /// Returns the correlation id, if one was stored.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.require(keys::CORRELATION_ID).ok()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Wraps a stored payload; anything but a JSON object is rejected.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// One triggered workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaInstance {
    pub saga_id: SagaId,
    pub order_id: OrderId,
    pub saga_type: String,
    pub status: SagaStatus,
    /// Index of the next step to run.
    pub current_step: u32,
    pub payload: SagaContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SagaInstance {
    /// Creates a `STARTED` saga at step 0.
    pub fn new(order_id: OrderId, saga_type: impl Into<String>, payload: SagaContext) -> Self {
        let now = Utc::now();
        Self {
            saga_id: SagaId::new(),
            order_id,
            saga_type: saga_type.into(),
            status: SagaStatus::Started,
            current_step: 0,
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Attempt record of one step; at most one per (saga, step name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaStepExecution {
    pub id: Uuid,
    pub saga_id: SagaId,
    pub step_name: String,
    pub status: StepStatus,
    pub executed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A saga with its step rows, as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaReport {
    #[serde(flatten)]
    pub saga: SagaInstance,
    pub steps: Vec<SagaStepExecution>,
}
