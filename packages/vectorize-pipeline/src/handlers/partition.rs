//! Partitioning step
//!
//! Splits the extracted text into partitions. Not ready until extraction
//! has produced text.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vectorize_state::request::PartitionConfig;
use vectorize_state::{
    ArtifactType, StateStore, StepName, VectorizationArtifact, VectorizationRequest,
    VectorizationState,
};

use super::{ensure_active, step_parameters, StepHandler};
use crate::error::Result;
use crate::services::{TextPartitioningService, VectorizationServiceFactory};

pub struct PartitionHandler {
    state_store: Arc<StateStore>,
    factory: Arc<dyn VectorizationServiceFactory<dyn TextPartitioningService>>,
}

impl PartitionHandler {
    pub fn new(
        state_store: Arc<StateStore>,
        factory: Arc<dyn VectorizationServiceFactory<dyn TextPartitioningService>>,
    ) -> Self {
        Self {
            state_store,
            factory,
        }
    }
}

#[async_trait]
impl StepHandler for PartitionHandler {
    fn step_name(&self) -> StepName {
        StepName::Partition
    }

    async fn invoke(
        &self,
        request: &VectorizationRequest,
        state: &mut VectorizationState,
        token: &CancellationToken,
    ) -> Result<bool> {
        ensure_active(token)?;

        self.state_store
            .load_artifacts(state, ArtifactType::ExtractedText, token)
            .await?;
        let text = match state
            .artifacts_of_type(ArtifactType::ExtractedText)
            .first()
            .and_then(|a| a.content.clone())
        {
            Some(text) if !text.is_empty() => text,
            _ => return Ok(false),
        };

        let config = PartitionConfig::from_parameters(step_parameters(request, StepName::Partition)?)
            .map_err(crate::error::PipelineError::configuration)?;
        let (service, _profile) = self
            .factory
            .get_service_with_profile(&config.text_partitioning_profile_name)
            .await?;

        ensure_active(token)?;
        let partitions = service.partition(&text).await?;

        info!(
            request_id = %request.id,
            content = %request.content_identifier.unique_id(),
            partitions = partitions.len(),
            "Partitioned content text"
        );

        for (i, partition) in partitions.into_iter().enumerate() {
            state.upsert_artifact(VectorizationArtifact::new(
                ArtifactType::TextPartition,
                i as u32 + 1,
                partition,
            ));
        }
        Ok(true)
    }
}
