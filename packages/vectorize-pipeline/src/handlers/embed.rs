//! Embedding step
//!
//! Embeds every text partition and stores each vector at the same position
//! as its source partition. Not ready until partitions exist.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vectorize_state::request::EmbedConfig;
use vectorize_state::{
    ArtifactType, StateStore, StepName, VectorizationArtifact, VectorizationRequest,
    VectorizationState,
};

use super::{ensure_active, step_parameters, StepHandler};
use crate::error::{PipelineError, Result};
use crate::retry::{self, with_backoff};
use crate::services::{TextEmbeddingService, VectorizationServiceFactory};

pub struct EmbeddingHandler {
    state_store: Arc<StateStore>,
    factory: Arc<dyn VectorizationServiceFactory<dyn TextEmbeddingService>>,
}

impl EmbeddingHandler {
    pub fn new(
        state_store: Arc<StateStore>,
        factory: Arc<dyn VectorizationServiceFactory<dyn TextEmbeddingService>>,
    ) -> Self {
        Self {
            state_store,
            factory,
        }
    }
}

#[async_trait]
impl StepHandler for EmbeddingHandler {
    fn step_name(&self) -> StepName {
        StepName::Embed
    }

    async fn invoke(
        &self,
        request: &VectorizationRequest,
        state: &mut VectorizationState,
        token: &CancellationToken,
    ) -> Result<bool> {
        ensure_active(token)?;

        self.state_store
            .load_artifacts(state, ArtifactType::TextPartition, token)
            .await?;
        let partitions: Vec<(u32, String)> = state
            .artifacts_of_type(ArtifactType::TextPartition)
            .iter()
            .filter_map(|a| a.content.clone().map(|c| (a.position, c)))
            .collect();
        if partitions.is_empty() {
            return Ok(false);
        }

        let config = EmbedConfig::from_parameters(step_parameters(request, StepName::Embed)?)
            .map_err(PipelineError::configuration)?;
        let (service, profile) = self
            .factory
            .get_service_with_profile(&config.text_embedding_profile_name)
            .await?;

        let texts: Vec<String> = partitions.iter().map(|(_, text)| text.clone()).collect();
        let texts_ref = &texts;
        let embeddings = with_backoff(
            &profile.name,
            retry::DEFAULT_ATTEMPTS,
            retry::DEFAULT_BASE_DELAY,
            || {
                let service = Arc::clone(&service);
                let token = token.clone();
                async move {
                    service
                        .embed(texts_ref, &token)
                        .await
                        .map_err(|e| e.to_string())
                }
            },
        )
        .await?;

        if embeddings.len() != partitions.len() {
            return Err(PipelineError::step_failed(
                StepName::Embed.as_str(),
                format!(
                    "Embedding service returned {} vectors for {} partitions",
                    embeddings.len(),
                    partitions.len()
                ),
            ));
        }

        info!(
            request_id = %request.id,
            content = %request.content_identifier.unique_id(),
            embeddings = embeddings.len(),
            "Embedded content partitions"
        );

        for ((position, _), embedding) in partitions.iter().zip(embeddings) {
            state.upsert_artifact(VectorizationArtifact::new(
                ArtifactType::TextEmbeddingVector,
                *position,
                serde_json::to_string(&embedding)?,
            ));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{Embedding, MapServiceFactory, ServiceProfile};
    use vectorize_state::{ContentIdentifier, MemoryStorage, ProcessingType, VectorizationStep};

    struct LengthEmbedder;

    #[async_trait]
    impl TextEmbeddingService for LengthEmbedder {
        async fn embed(
            &self,
            texts: &[String],
            _token: &CancellationToken,
        ) -> Result<Vec<Embedding>> {
            Ok(texts
                .iter()
                .map(|t| Embedding(vec![t.len() as f32]))
                .collect())
        }
    }

    fn handler() -> EmbeddingHandler {
        let mut factory: MapServiceFactory<dyn TextEmbeddingService> = MapServiceFactory::new();
        factory.register(ServiceProfile::new("embedder"), Arc::new(LengthEmbedder));
        EmbeddingHandler::new(
            Arc::new(StateStore::new(Arc::new(MemoryStorage::new()))),
            Arc::new(factory),
        )
    }

    fn request() -> VectorizationRequest {
        VectorizationRequest::new(
            uuid::Uuid::new_v4().to_string(),
            ContentIdentifier::new(
                vec!["container".to_string(), "doc.pdf".to_string()],
                "docs-source",
                "unit",
                "doc",
            ),
            ProcessingType::Synchronous,
            vec![VectorizationStep::new(StepName::Embed)
                .with_parameter("text_embedding_profile_name", "embedder")],
        )
    }

    #[tokio::test]
    async fn test_not_ready_without_partitions() {
        let handler = handler();
        let request = request();
        let mut state = VectorizationState::new(request.content_identifier.clone(), &request.id);

        let ran = handler
            .invoke(&request, &mut state, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!ran);
        assert!(state.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_embeddings_mirror_partition_positions() {
        let handler = handler();
        let request = request();
        let mut state = VectorizationState::new(request.content_identifier.clone(), &request.id);
        // Partitions at non-contiguous positions
        state.upsert_artifact(VectorizationArtifact::new(ArtifactType::TextPartition, 2, "ab"));
        state.upsert_artifact(VectorizationArtifact::new(
            ArtifactType::TextPartition,
            5,
            "abcd",
        ));

        let ran = handler
            .invoke(&request, &mut state, &CancellationToken::new())
            .await
            .unwrap();
        assert!(ran);

        let vectors = state.artifacts_of_type(ArtifactType::TextEmbeddingVector);
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].position, 2);
        assert_eq!(vectors[1].position, 5);

        let first: Embedding = serde_json::from_str(vectors[0].content.as_deref().unwrap()).unwrap();
        assert_eq!(first, Embedding(vec![2.0]));
    }
}
