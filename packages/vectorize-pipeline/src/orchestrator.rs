//! Pipeline orchestrator
//!
//! Drives a [`VectorizationRequest`] through its remaining steps in
//! configured order, persisting state after every completed step so a fresh
//! process can resume mid-pipeline. Requests for the same content are
//! serialized in-process through a per-persistence-id async mutex;
//! cross-process exclusion comes from the store's version stamp.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vectorize_state::{
    StateStore, StepName, VectorizationPipelineState, VectorizationRequest, VectorizationState,
};

use crate::error::{PipelineError, Result};
use crate::handlers::StepHandler;

/// Outcome of a synchronous pass over a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Every configured step has completed
    Completed,
    /// A step reported its inputs are not yet available; the pass stopped
    /// there without error
    NotReady { pending: StepName },
}

pub struct PipelineOrchestrator {
    state_store: Arc<StateStore>,
    handlers: HashMap<StepName, Arc<dyn StepHandler>>,
    run_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PipelineOrchestrator {
    pub fn new(state_store: Arc<StateStore>) -> Self {
        Self {
            state_store,
            handlers: HashMap::new(),
            run_locks: DashMap::new(),
        }
    }

    /// Register a step handler.
    pub fn register_handler(&mut self, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(handler.step_name(), handler);
    }

    fn handler_for(&self, name: StepName) -> Result<Arc<dyn StepHandler>> {
        self.handlers.get(&name).cloned().ok_or_else(|| {
            PipelineError::Configuration(format!("No handler registered for step {name}"))
        })
    }

    fn run_lock(&self, persistence_id: &str) -> Arc<Mutex<()>> {
        self.run_locks
            .entry(persistence_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Load existing state for the request's content, or create fresh state.
    async fn load_or_create_state(
        &self,
        request: &VectorizationRequest,
        token: &CancellationToken,
    ) -> Result<VectorizationState> {
        if self
            .state_store
            .has_state(&request.content_identifier, token)
            .await?
        {
            let mut state = self
                .state_store
                .read_state(&request.content_identifier, token)
                .await?;
            state.current_request_id = request.id.clone();
            info!(
                request_id = %request.id,
                content = %request.content_identifier.unique_id(),
                artifacts = state.artifacts.len(),
                "Resuming from persisted vectorization state"
            );
            Ok(state)
        } else {
            Ok(VectorizationState::new(
                request.content_identifier.clone(),
                request.id.clone(),
            ))
        }
    }

    /// Execute every remaining step of a request, in configured order.
    ///
    /// After each completed step the request bookkeeping is updated and the
    /// state is persisted, so an interruption between steps loses at most
    /// the step in flight. A step that reports "not ready" stops the pass
    /// with [`RequestOutcome::NotReady`]; a failing step propagates its
    /// error and stays in the remaining list.
    pub async fn execute_request(
        &self,
        request: &mut VectorizationRequest,
        token: &CancellationToken,
    ) -> Result<RequestOutcome> {
        request.validate().map_err(PipelineError::configuration)?;

        let persistence_id = request.content_identifier.persistence_id();
        let lock = self.run_lock(&persistence_id);
        let _guard = lock.lock().await;

        info!(
            request_id = %request.id,
            content = %request.content_identifier.unique_id(),
            remaining = request.remaining_steps.len(),
            "Starting vectorization request"
        );

        let mut state = self.load_or_create_state(request, token).await?;

        while let Some(step_name) = request.remaining_steps.first().copied() {
            let handler = self.handler_for(step_name)?;
            match handler.invoke(request, &mut state, token).await {
                Ok(true) => {
                    request.mark_complete(step_name)?;
                    self.state_store.save_state(&mut state, token).await?;
                    info!(
                        request_id = %request.id,
                        step = %step_name,
                        "Step completed and state persisted"
                    );
                }
                Ok(false) => {
                    info!(
                        request_id = %request.id,
                        step = %step_name,
                        "Step not ready, stopping pass"
                    );
                    return Ok(RequestOutcome::NotReady { pending: step_name });
                }
                Err(e) => {
                    error!(
                        request_id = %request.id,
                        step = %step_name,
                        error = %e,
                        "Step failed"
                    );
                    return Err(e);
                }
            }
        }

        info!(request_id = %request.id, "Vectorization request completed");
        Ok(RequestOutcome::Completed)
    }

    /// Attempt one named step of a request.
    ///
    /// Entry point for asynchronous processing, where steps of one request
    /// arrive as separate messages. Reentrant: the same step may be
    /// attempted repeatedly, and steps may run against states where later
    /// artifacts already exist.
    ///
    /// Returns `Ok(true)` when the step completed (bookkeeping updated and
    /// state persisted), `Ok(false)` when the step is not ready.
    pub async fn execute_step(
        &self,
        step_name: StepName,
        request: &mut VectorizationRequest,
        token: &CancellationToken,
    ) -> Result<bool> {
        request.validate().map_err(PipelineError::configuration)?;
        if !request.remaining_steps.contains(&step_name) {
            return Err(PipelineError::Configuration(format!(
                "Step {step_name} is not in the request's remaining steps"
            )));
        }

        let persistence_id = request.content_identifier.persistence_id();
        let lock = self.run_lock(&persistence_id);
        let _guard = lock.lock().await;

        let handler = self.handler_for(step_name)?;
        let mut state = self.load_or_create_state(request, token).await?;

        match handler.invoke(request, &mut state, token).await? {
            true => {
                request.mark_complete(step_name)?;
                self.state_store.save_state(&mut state, token).await?;
                info!(
                    request_id = %request.id,
                    step = %step_name,
                    "Step completed and state persisted"
                );
                Ok(true)
            }
            false => Ok(false),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Pipeline Executions
    // ═══════════════════════════════════════════════════════════════════

    /// Begin a pipeline execution and persist its in-progress state.
    pub async fn start_pipeline_execution(
        &self,
        pipeline_object_id: &str,
        execution_id: &str,
        token: &CancellationToken,
    ) -> Result<VectorizationPipelineState> {
        let mut state = VectorizationPipelineState::new(pipeline_object_id, execution_id);
        state.start()?;
        self.state_store.save_pipeline_state(&state, token).await?;
        info!(
            pipeline = state.pipeline_name(),
            execution_id,
            "Pipeline execution started"
        );
        Ok(state)
    }

    /// Finish a pipeline execution with its final counts.
    pub async fn complete_pipeline_execution(
        &self,
        state: &mut VectorizationPipelineState,
        processed_count: usize,
        error_count: usize,
        token: &CancellationToken,
    ) -> Result<()> {
        state.complete(processed_count, error_count)?;
        self.state_store.save_pipeline_state(state, token).await?;
        info!(
            pipeline = state.pipeline_name(),
            execution_id = %state.execution_id,
            status = state.status.as_str(),
            processed_count,
            error_count,
            "Pipeline execution finished"
        );
        Ok(())
    }

    /// Mark a pipeline execution failed.
    pub async fn fail_pipeline_execution(
        &self,
        state: &mut VectorizationPipelineState,
        error: impl Into<String>,
        token: &CancellationToken,
    ) -> Result<()> {
        let message = error.into();
        state.fail(message.clone())?;
        self.state_store.save_pipeline_state(state, token).await?;
        error!(
            pipeline = state.pipeline_name(),
            execution_id = %state.execution_id,
            error = %message,
            "Pipeline execution failed"
        );
        Ok(())
    }
}
