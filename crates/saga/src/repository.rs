use async_trait::async_trait;
use common::{OrderId, SagaId};

use crate::{Result, SagaContext, SagaInstance, SagaStatus, SagaStepExecution, StepStatus};

/// Persistence for saga instances and their step rows.
#[async_trait]
pub trait SagaRepository: Send + Sync {
    /// Stores a new saga.
    ///
    /// Fails with `AlreadyExists` if the order already has a saga of the
    /// same type.
    async fn create(&self, saga: &SagaInstance) -> Result<()>;

    /// Loads a saga by id.
    async fn find(&self, saga_id: SagaId) -> Result<Option<SagaInstance>>;

    /// Loads the saga of the given type for an order.
    async fn find_by_order(&self, order_id: OrderId, saga_type: &str)
    -> Result<Option<SagaInstance>>;

    /// Moves a saga to `status`; backward moves fail with `InvalidTransition`.
    async fn update_status(&self, saga_id: SagaId, status: SagaStatus) -> Result<()>;

    /// Stores the next step index and the context accumulated so far.
    async fn update_progress(
        &self,
        saga_id: SagaId,
        current_step: u32,
        payload: &SagaContext,
    ) -> Result<()>;

    /// Inserts or overwrites the row for (saga, step name).
    async fn record_step(
        &self,
        saga_id: SagaId,
        step_name: &str,
        status: StepStatus,
        error_message: Option<String>,
    ) -> Result<SagaStepExecution>;

    /// Lists every step row of a saga in execution order.
    async fn steps_for(&self, saga_id: SagaId) -> Result<Vec<SagaStepExecution>>;

    /// Lists the `SUCCESS` rows of a saga, most recent first.
    async fn successful_steps(&self, saga_id: SagaId) -> Result<Vec<SagaStepExecution>>;

    /// Marks a step row `COMPENSATED`.
    async fn mark_compensated(&self, saga_id: SagaId, step_name: &str) -> Result<()>;

    /// Lists steps still `SUCCESS` in sagas that finished compensating.
    ///
    /// Each row is a compensation that failed and needs manual attention.
    async fn unresolved_compensations(&self) -> Result<Vec<SagaStepExecution>>;
}
