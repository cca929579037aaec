//! Extraction step
//!
//! Pulls raw text out of the content source and stores it as
//! `ExtractedText` at position 1. The content source profile comes from the
//! content identifier, unless the step parameters override it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vectorize_state::{
    ArtifactType, StepName, VectorizationArtifact, VectorizationRequest, VectorizationState,
};
use vectorize_state::request::ExtractConfig;

use super::{ensure_active, step_parameters, StepHandler};
use crate::error::Result;
use crate::retry::{self, with_backoff};
use crate::services::{ContentSourceService, VectorizationServiceFactory};

pub struct ExtractionHandler {
    factory: Arc<dyn VectorizationServiceFactory<dyn ContentSourceService>>,
}

impl ExtractionHandler {
    pub fn new(factory: Arc<dyn VectorizationServiceFactory<dyn ContentSourceService>>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl StepHandler for ExtractionHandler {
    fn step_name(&self) -> StepName {
        StepName::Extract
    }

    async fn invoke(
        &self,
        request: &VectorizationRequest,
        state: &mut VectorizationState,
        token: &CancellationToken,
    ) -> Result<bool> {
        ensure_active(token)?;

        let config = ExtractConfig::from_parameters(step_parameters(request, StepName::Extract)?);
        let profile_name = config
            .content_source_profile_name
            .unwrap_or_else(|| request.content_identifier.content_source_profile.clone());

        let (service, profile) = self.factory.get_service_with_profile(&profile_name).await?;

        let content = &request.content_identifier;
        let text = with_backoff(
            &profile.name,
            retry::DEFAULT_ATTEMPTS,
            retry::DEFAULT_BASE_DELAY,
            || {
                let service = Arc::clone(&service);
                let token = token.clone();
                async move {
                    service
                        .extract_text(content, &token)
                        .await
                        .map_err(|e| e.to_string())
                }
            },
        )
        .await?;

        info!(
            request_id = %request.id,
            content = %request.content_identifier.unique_id(),
            bytes = text.len(),
            "Extracted content text"
        );

        state.upsert_artifact(VectorizationArtifact::new(
            ArtifactType::ExtractedText,
            1,
            text,
        ));
        Ok(true)
    }
}
