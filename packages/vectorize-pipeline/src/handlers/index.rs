//! Indexing step
//!
//! Pairs each embedding with the partition at the same rank, writes the
//! pairs into the search index, and records one `IndexedEntry` per written
//! part. Not ready until both embeddings and partitions exist.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vectorize_state::request::IndexConfig;
use vectorize_state::{
    ArtifactType, StateStore, StepName, VectorizationArtifact, VectorizationRequest,
    VectorizationState,
};

use super::{ensure_active, step_parameters, StepHandler};
use crate::error::{PipelineError, Result};
use crate::retry::{self, with_backoff};
use crate::services::{
    EmbeddedContent, EmbeddedContentPart, Embedding, IndexingService, VectorizationServiceFactory,
};

pub struct IndexingHandler {
    state_store: Arc<StateStore>,
    factory: Arc<dyn VectorizationServiceFactory<dyn IndexingService>>,
}

impl IndexingHandler {
    pub fn new(
        state_store: Arc<StateStore>,
        factory: Arc<dyn VectorizationServiceFactory<dyn IndexingService>>,
    ) -> Self {
        Self {
            state_store,
            factory,
        }
    }
}

#[async_trait]
impl StepHandler for IndexingHandler {
    fn step_name(&self) -> StepName {
        StepName::Index
    }

    async fn invoke(
        &self,
        request: &VectorizationRequest,
        state: &mut VectorizationState,
        token: &CancellationToken,
    ) -> Result<bool> {
        ensure_active(token)?;

        // Readiness check before any mutation
        if !state.has_artifacts(ArtifactType::TextEmbeddingVector)
            || !state.has_artifacts(ArtifactType::TextPartition)
        {
            return Ok(false);
        }

        self.state_store
            .load_artifacts(state, ArtifactType::TextPartition, token)
            .await?;
        self.state_store
            .load_artifacts(state, ArtifactType::TextEmbeddingVector, token)
            .await?;

        let unique_id = request.content_identifier.unique_id();
        let embeddings = state.artifacts_of_type(ArtifactType::TextEmbeddingVector);
        let partitions = state.artifacts_of_type(ArtifactType::TextPartition);

        // The k-th embedding (position order) belongs with the k-th
        // partition; the part id carries the partition's position.
        let mut parts = Vec::new();
        let mut part_positions = Vec::new();
        for (embedding_artifact, partition_artifact) in embeddings.iter().zip(&partitions) {
            let embedding: Embedding = serde_json::from_str(
                embedding_artifact.content.as_deref().ok_or_else(|| {
                    PipelineError::step_failed(
                        StepName::Index.as_str(),
                        format!(
                            "Embedding at position {} has no content",
                            embedding_artifact.position
                        ),
                    )
                })?,
            )?;
            let content = partition_artifact.content.clone().ok_or_else(|| {
                PipelineError::step_failed(
                    StepName::Index.as_str(),
                    format!(
                        "Partition at position {} has no content",
                        partition_artifact.position
                    ),
                )
            })?;

            parts.push(EmbeddedContentPart {
                id: format!("{unique_id}#{:06}", partition_artifact.position),
                content,
                embedding,
            });
            part_positions.push(partition_artifact.position);
        }

        let config = IndexConfig::from_parameters(step_parameters(request, StepName::Index)?)
            .map_err(PipelineError::configuration)?;
        let (service, profile) = self
            .factory
            .get_service_with_profile(&config.indexing_profile_name)
            .await?;
        let index_name = profile.required_setting("index_name")?.to_string();

        let content = EmbeddedContent {
            content_id: request.content_identifier.clone(),
            parts,
        };
        let content_ref = &content;
        let index_name_ref = index_name.as_str();
        let indexed_ids = with_backoff(
            &profile.name,
            retry::DEFAULT_ATTEMPTS,
            retry::DEFAULT_BASE_DELAY,
            || {
                let service = Arc::clone(&service);
                async move {
                    service
                        .index(content_ref, index_name_ref)
                        .await
                        .map_err(|e| e.to_string())
                }
            },
        )
        .await?;

        info!(
            request_id = %request.id,
            content = %unique_id,
            index = %index_name,
            parts = indexed_ids.len(),
            "Indexed embedded content"
        );

        for (part, position) in content.parts.iter().zip(part_positions) {
            state.upsert_artifact(VectorizationArtifact::new(
                ArtifactType::IndexedEntry,
                position,
                part.id.clone(),
            ));
        }
        Ok(true)
    }
}
