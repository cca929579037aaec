//! Pipeline step handlers
//!
//! One handler per [`StepName`]. Handlers are idempotent through the keyed
//! artifact arena: re-invoking a handler replaces its previous outputs
//! instead of appending new ones. A handler whose inputs are not yet in the
//! state returns `Ok(false)` ("not ready") without mutating anything; that
//! is flow control, never an error.

mod embed;
mod extract;
mod index;
mod partition;

pub use embed::EmbeddingHandler;
pub use extract::ExtractionHandler;
pub use index::IndexingHandler;
pub use partition::PartitionHandler;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vectorize_state::{StepName, VectorizationRequest, VectorizationState};

use crate::error::{PipelineError, Result};

/// One step of the vectorization pipeline
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step this handler implements.
    fn step_name(&self) -> StepName;

    /// Attempt the step against the current state.
    ///
    /// Returns `Ok(true)` when the step ran to completion, `Ok(false)` when
    /// its inputs are not yet available. In the `Ok(false)` case the state
    /// must be left untouched.
    ///
    /// # Errors
    ///
    /// Fatal conditions only: configuration problems, unsupported services,
    /// exhausted transport retries, cancellation.
    async fn invoke(
        &self,
        request: &VectorizationRequest,
        state: &mut VectorizationState,
        token: &CancellationToken,
    ) -> Result<bool>;
}

/// Look up the step's configured parameters on the request.
fn step_parameters<'a>(
    request: &'a VectorizationRequest,
    name: StepName,
) -> Result<&'a std::collections::HashMap<String, String>> {
    request
        .step(name)
        .map(|step| &step.parameters)
        .ok_or_else(|| PipelineError::UnsupportedStep(name.as_str().to_string()))
}

fn ensure_active(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}
