use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, SagaId};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    Result, SagaContext, SagaError, SagaInstance, SagaRepository, SagaStatus, SagaStepExecution,
    StepStatus,
};

#[derive(Default)]
struct State {
    sagas: HashMap<SagaId, SagaInstance>,
    /// Step rows with the sequence number of their last write.
    steps: Vec<(u64, SagaStepExecution)>,
    next_seq: u64,
}

/// In-memory saga repository for testing and single-process deployments.
///
/// Step rows are ordered by write sequence rather than timestamp, so two
/// writes within the same clock tick still sort deterministically.
#[derive(Clone, Default)]
pub struct InMemorySagaRepository {
    state: Arc<RwLock<State>>,
}

impl InMemorySagaRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sagas.
    pub async fn len(&self) -> usize {
        self.state.read().await.sagas.len()
    }

    /// Returns true if no sagas are stored.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.sagas.is_empty()
    }
}

#[async_trait]
impl SagaRepository for InMemorySagaRepository {
    async fn create(&self, saga: &SagaInstance) -> Result<()> {
        let mut state = self.state.write().await;
        let duplicate = state
            .sagas
            .values()
            .any(|s| s.order_id == saga.order_id && s.saga_type == saga.saga_type);
        if duplicate {
            return Err(SagaError::AlreadyExists {
                order_id: saga.order_id,
                saga_type: saga.saga_type.clone(),
            });
        }
        state.sagas.insert(saga.saga_id, saga.clone());
        Ok(())
    }

    async fn find(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        Ok(self.state.read().await.sagas.get(&saga_id).cloned())
    }

    async fn find_by_order(
        &self,
        order_id: OrderId,
        saga_type: &str,
    ) -> Result<Option<SagaInstance>> {
        let state = self.state.read().await;
        Ok(state
            .sagas
            .values()
            .find(|s| s.order_id == order_id && s.saga_type == saga_type)
            .cloned())
    }

    async fn update_status(&self, saga_id: SagaId, status: SagaStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let saga = state
            .sagas
            .get_mut(&saga_id)
            .ok_or(SagaError::NotFound(saga_id))?;

        if !saga.status.can_transition_to(status) {
            return Err(SagaError::InvalidTransition {
                from: saga.status,
                to: status,
            });
        }
        saga.status = status;
        saga.updated_at = Utc::now();
        Ok(())
    }

    async fn update_progress(
        &self,
        saga_id: SagaId,
        current_step: u32,
        payload: &SagaContext,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let saga = state
            .sagas
            .get_mut(&saga_id)
            .ok_or(SagaError::NotFound(saga_id))?;

        saga.current_step = current_step;
        saga.payload = payload.clone();
        saga.updated_at = Utc::now();
        Ok(())
    }

    async fn record_step(
        &self,
        saga_id: SagaId,
        step_name: &str,
        status: StepStatus,
        error_message: Option<String>,
    ) -> Result<SagaStepExecution> {
        let mut state = self.state.write().await;
        if !state.sagas.contains_key(&saga_id) {
            return Err(SagaError::NotFound(saga_id));
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        let now = Utc::now();

        let position = state
            .steps
            .iter()
            .position(|(_, s)| s.saga_id == saga_id && s.step_name == step_name);
        let execution = match position {
            Some(index) => {
                let (row_seq, row) = &mut state.steps[index];
                *row_seq = seq;
                row.status = status;
                row.executed_at = now;
                row.error_message = error_message;
                row.clone()
            }
            None => {
                let row = SagaStepExecution {
                    id: Uuid::new_v4(),
                    saga_id,
                    step_name: step_name.to_string(),
                    status,
                    executed_at: now,
                    error_message,
                };
                state.steps.push((seq, row.clone()));
                row
            }
        };
        Ok(execution)
    }

    async fn steps_for(&self, saga_id: SagaId) -> Result<Vec<SagaStepExecution>> {
        let state = self.state.read().await;
        let mut rows: Vec<&(u64, SagaStepExecution)> =
            state.steps.iter().filter(|(_, s)| s.saga_id == saga_id).collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, s)| s.clone()).collect())
    }

    async fn successful_steps(&self, saga_id: SagaId) -> Result<Vec<SagaStepExecution>> {
        let state = self.state.read().await;
        let mut rows: Vec<&(u64, SagaStepExecution)> = state
            .steps
            .iter()
            .filter(|(_, s)| s.saga_id == saga_id && s.status == StepStatus::Success)
            .collect();
        rows.sort_by_key(|(seq, _)| std::cmp::Reverse(*seq));
        Ok(rows.into_iter().map(|(_, s)| s.clone()).collect())
    }

    async fn mark_compensated(&self, saga_id: SagaId, step_name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        // The row keeps its position; compensation is not a new attempt.
        if let Some((_, row)) = state
            .steps
            .iter_mut()
            .find(|(_, s)| s.saga_id == saga_id && s.step_name == step_name)
        {
            row.status = StepStatus::Compensated;
        }
        Ok(())
    }

    async fn unresolved_compensations(&self) -> Result<Vec<SagaStepExecution>> {
        let state = self.state.read().await;
        let mut rows: Vec<&(u64, SagaStepExecution)> = state
            .steps
            .iter()
            .filter(|(_, s)| {
                s.status == StepStatus::Success
                    && state
                        .sagas
                        .get(&s.saga_id)
                        .is_some_and(|saga| saga.status == SagaStatus::Compensated)
            })
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, s)| s.clone()).collect())
    }
}
