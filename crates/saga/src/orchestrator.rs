//! Saga orchestrator: runs steps in order and compensates on failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{CorrelationId, OrderId, SagaId};
use event_bus::EventBus;
use orders::{Order, OrderRepository};

use crate::{
    InventoryClient, Result, SagaContext, SagaError, SagaInstance, SagaReport, SagaRepository,
    SagaServices, SagaStatus, SagaStep, SagaStepExecution, SagaType, StepError, StepStatus,
};

/// Default timeout applied to each step action and compensation.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// How a call to [`SagaOrchestrator::execute`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaOutcome {
    /// Every step succeeded.
    Completed(SagaId),
    /// A step failed and completed steps were compensated.
    Compensated(SagaId),
    /// The order already had a saga of this type; nothing ran.
    AlreadyStarted(SagaId),
}

impl SagaOutcome {
    pub fn saga_id(&self) -> SagaId {
        match self {
            SagaOutcome::Completed(id)
            | SagaOutcome::Compensated(id)
            | SagaOutcome::AlreadyStarted(id) => *id,
        }
    }
}

/// Drives sagas against the inventory client, the order store and the bus.
///
/// Progress is persisted after every step so a crashed saga can be
/// diagnosed, and a second trigger for the same order is a no-op.
pub struct SagaOrchestrator<S, I, R, B>
where
    S: SagaRepository,
    I: InventoryClient,
    R: OrderRepository,
    B: EventBus,
{
    repository: Arc<S>,
    services: SagaServices<I, R, B>,
    step_timeout: Duration,
}

impl<S, I, R, B> Clone for SagaOrchestrator<S, I, R, B>
where
    S: SagaRepository,
    I: InventoryClient,
    R: OrderRepository,
    B: EventBus,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            services: self.services.clone(),
            step_timeout: self.step_timeout,
        }
    }
}

impl<S, I, R, B> SagaOrchestrator<S, I, R, B>
where
    S: SagaRepository + 'static,
    I: InventoryClient + 'static,
    R: OrderRepository + 'static,
    B: EventBus + 'static,
{
    /// Creates a new orchestrator with the default step timeout.
    pub fn new(repository: Arc<S>, services: SagaServices<I, R, B>) -> Self {
        Self {
            repository,
            services,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Gets a reference to the saga repository.
    pub fn repository(&self) -> &S {
        &self.repository
    }

    pub fn services(&self) -> &SagaServices<I, R, B> {
        &self.services
    }

    /// Runs a saga for `order`.
    ///
    /// Step failures become saga state and return `Compensated`; only
    /// failures of the saga store itself are returned as errors.
    pub async fn execute(&self, saga_type: SagaType, order: &Order) -> Result<SagaOutcome> {
        self.execute_correlated(saga_type, order, CorrelationId::new())
            .await
    }

    /// Runs a saga whose events carry `correlation_id`.
    #[tracing::instrument(skip(self, order), fields(%saga_type, order_id = %order.id, %correlation_id))]
    pub async fn execute_correlated(
        &self,
        saga_type: SagaType,
        order: &Order,
        correlation_id: CorrelationId,
    ) -> Result<SagaOutcome> {
        if let Some(existing) = self
            .repository
            .find_by_order(order.id, saga_type.as_str())
            .await?
        {
            tracing::info!(saga_id = %existing.saga_id, "saga already started, skipping");
            return Ok(SagaOutcome::AlreadyStarted(existing.saga_id));
        }

        let context = SagaContext::for_order(order, correlation_id)?;
        let saga = SagaInstance::new(order.id, saga_type.as_str(), context);

        match self.repository.create(&saga).await {
            Ok(()) => {}
            Err(SagaError::AlreadyExists { .. }) => {
                // Lost a race with a concurrent trigger.
                let existing = self
                    .repository
                    .find_by_order(order.id, saga_type.as_str())
                    .await?
                    .ok_or(SagaError::NotFound(saga.saga_id))?;
                tracing::info!(saga_id = %existing.saga_id, "saga already started, skipping");
                return Ok(SagaOutcome::AlreadyStarted(existing.saga_id));
            }
            Err(e) => return Err(e),
        }

        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();
        tracing::info!(saga_id = %saga.saga_id, "saga started");

        let outcome = self.run_steps(saga, saga_type.steps()).await?;

        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        Ok(outcome)
    }

    /// Runs `steps` in order for a persisted saga.
    async fn run_steps<St>(&self, saga: SagaInstance, steps: &[St]) -> Result<SagaOutcome>
    where
        St: SagaStep<SagaServices<I, R, B>>,
    {
        let saga_id = saga.saga_id;
        let mut context = saga.payload;

        for (index, step) in steps.iter().enumerate() {
            let name = step.name();
            self.repository
                .record_step(saga_id, name, StepStatus::Pending, None)
                .await?;
            tracing::info!(%saga_id, step = name, "saga step started");

            let result =
                match tokio::time::timeout(self.step_timeout, step.execute(&self.services, &context))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(StepError::timeout(self.step_timeout)),
                };

            match result {
                Ok(additions) => {
                    context.merge(additions);
                    self.repository
                        .record_step(saga_id, name, StepStatus::Success, None)
                        .await?;
                    self.repository
                        .update_progress(saga_id, index as u32 + 1, &context)
                        .await?;
                    tracing::info!(%saga_id, step = name, "saga step completed");
                }
                Err(error) => {
                    tracing::warn!(
                        %saga_id,
                        step = name,
                        kind = %error.kind(),
                        error = %error,
                        "saga step failed"
                    );
                    self.repository
                        .record_step(
                            saga_id,
                            name,
                            StepStatus::Failed,
                            Some(error.message().to_string()),
                        )
                        .await?;
                    self.repository
                        .update_status(saga_id, SagaStatus::Failed)
                        .await?;

                    let failed = step.compensate_on_failure(&error).then_some(step);
                    self.compensate(saga_id, steps, failed).await?;
                    return Ok(SagaOutcome::Compensated(saga_id));
                }
            }
        }

        self.repository
            .update_status(saga_id, SagaStatus::Completed)
            .await?;
        metrics::counter!("saga_completed").increment(1);
        tracing::info!(%saga_id, "saga completed successfully");

        Ok(SagaOutcome::Completed(saga_id))
    }

    /// Compensates completed steps in reverse order.
    ///
    /// `failed` is the step that just failed, when its own compensation
    /// must run first. A failed compensation is logged and left `SUCCESS`
    /// so it shows up in `unresolved_compensations`.
    async fn compensate<St>(&self, saga_id: SagaId, steps: &[St], failed: Option<&St>) -> Result<()>
    where
        St: SagaStep<SagaServices<I, R, B>>,
    {
        self.repository
            .update_status(saga_id, SagaStatus::Compensating)
            .await?;
        tracing::info!(%saga_id, "saga compensation started");

        let context = self
            .repository
            .find(saga_id)
            .await?
            .ok_or(SagaError::NotFound(saga_id))?
            .payload;

        if let Some(step) = failed {
            if let Err(error) = self.run_compensation(step, &context).await {
                metrics::counter!("saga_compensation_failures").increment(1);
                tracing::error!(
                    %saga_id,
                    step = step.name(),
                    kind = %error.kind(),
                    error = %error,
                    "failed step compensation failed"
                );
            }
        }

        for execution in self.repository.successful_steps(saga_id).await? {
            let Some(step) = steps.iter().find(|s| s.name() == execution.step_name) else {
                tracing::warn!(%saga_id, step = %execution.step_name, "no compensation for unknown step");
                continue;
            };

            match self.run_compensation(step, &context).await {
                Ok(()) => {
                    self.repository
                        .mark_compensated(saga_id, step.name())
                        .await?;
                    tracing::info!(%saga_id, step = step.name(), "saga step compensated");
                }
                Err(error) => {
                    metrics::counter!("saga_compensation_failures").increment(1);
                    tracing::error!(
                        %saga_id,
                        step = step.name(),
                        kind = %error.kind(),
                        error = %error,
                        "saga step compensation failed"
                    );
                }
            }
        }

        self.repository
            .update_status(saga_id, SagaStatus::Compensated)
            .await?;
        metrics::counter!("saga_compensated").increment(1);
        tracing::warn!(%saga_id, "saga compensated");
        Ok(())
    }

    async fn run_compensation<St>(
        &self,
        step: &St,
        context: &SagaContext,
    ) -> std::result::Result<(), StepError>
    where
        St: SagaStep<SagaServices<I, R, B>>,
    {
        match tokio::time::timeout(self.step_timeout, step.compensate(&self.services, context))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(StepError::timeout(self.step_timeout)),
        }
    }

    /// Loads the saga of `saga_type` for an order with its step rows.
    pub async fn report(&self, order_id: OrderId, saga_type: SagaType) -> Result<Option<SagaReport>> {
        let Some(saga) = self
            .repository
            .find_by_order(order_id, saga_type.as_str())
            .await?
        else {
            return Ok(None);
        };
        let steps = self.repository.steps_for(saga.saga_id).await?;
        Ok(Some(SagaReport { saga, steps }))
    }

    /// Step executions left `SUCCESS` inside compensated sagas.
    ///
    /// These are compensations that failed and need manual follow-up.
    pub async fn unresolved_compensations(&self) -> Result<Vec<SagaStepExecution>> {
        self.repository.unresolved_compensations().await
    }
}
