//! Backend service ports
//!
//! Step handlers never talk to content sources, partitioners, embedding
//! models, or indexes directly. They resolve a service through a
//! [`VectorizationServiceFactory`] by profile name and call it through one
//! of the port traits below. The algorithms behind the ports (PDF parsing,
//! token-aware splitting, model inference, vector search) live in adapters
//! outside this crate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use vectorize_state::ContentIdentifier;

use crate::error::{PipelineError, Result};

// ═══════════════════════════════════════════════════════════════════════════
// Profiles & Factory
// ═══════════════════════════════════════════════════════════════════════════

/// Named configuration for one backend service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProfile {
    pub name: String,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

impl ServiceProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: HashMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Look up a setting that the profile must carry.
    ///
    /// # Errors
    ///
    /// `Configuration` when the setting is absent.
    pub fn required_setting(&self, key: &str) -> Result<&str> {
        self.settings.get(key).map(String::as_str).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "Profile '{}' is missing required setting '{key}'",
                self.name
            ))
        })
    }
}

/// Resolves a backend service and its profile by profile name
#[async_trait]
pub trait VectorizationServiceFactory<S: ?Sized + Send + Sync>: Send + Sync {
    /// # Errors
    ///
    /// `UnsupportedService` when no service is registered under the name.
    async fn get_service_with_profile(
        &self,
        profile_name: &str,
    ) -> Result<(Arc<S>, ServiceProfile)>;
}

/// Map-backed factory, used for in-process wiring and tests
pub struct MapServiceFactory<S: ?Sized + Send + Sync> {
    services: HashMap<String, (Arc<S>, ServiceProfile)>,
}

impl<S: ?Sized + Send + Sync> Default for MapServiceFactory<S> {
    fn default() -> Self {
        Self {
            services: HashMap::new(),
        }
    }
}

impl<S: ?Sized + Send + Sync> MapServiceFactory<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, profile: ServiceProfile, service: Arc<S>) {
        self.services
            .insert(profile.name.clone(), (service, profile));
    }
}

#[async_trait]
impl<S: ?Sized + Send + Sync> VectorizationServiceFactory<S> for MapServiceFactory<S> {
    async fn get_service_with_profile(
        &self,
        profile_name: &str,
    ) -> Result<(Arc<S>, ServiceProfile)> {
        self.services
            .get(profile_name)
            .map(|(service, profile)| (Arc::clone(service), profile.clone()))
            .ok_or_else(|| PipelineError::UnsupportedService(profile_name.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Embedding Types
// ═══════════════════════════════════════════════════════════════════════════

/// Dense embedding vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One partition with its embedding, ready to index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedContentPart {
    /// Index part id, unique within the index
    pub id: String,
    pub content: String,
    pub embedding: Embedding,
}

/// Full embedded representation of one content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedContent {
    pub content_id: ContentIdentifier,
    pub parts: Vec<EmbeddedContentPart>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Service Ports
// ═══════════════════════════════════════════════════════════════════════════

/// Reads raw text out of a content source
#[async_trait]
pub trait ContentSourceService: Send + Sync {
    async fn extract_text(
        &self,
        content: &ContentIdentifier,
        token: &CancellationToken,
    ) -> Result<String>;
}

/// Splits text into partitions
#[async_trait]
pub trait TextPartitioningService: Send + Sync {
    async fn partition(&self, text: &str) -> Result<Vec<String>>;
}

impl std::fmt::Debug for dyn TextPartitioningService + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TextPartitioningService")
    }
}

/// Embeds text partitions
#[async_trait]
pub trait TextEmbeddingService: Send + Sync {
    /// Returns one embedding per input text, in input order.
    async fn embed(
        &self,
        texts: &[String],
        token: &CancellationToken,
    ) -> Result<Vec<Embedding>>;
}

/// Writes embedded parts into a search index
#[async_trait]
pub trait IndexingService: Send + Sync {
    /// Returns the ids of the parts written to the index.
    async fn index(&self, content: &EmbeddedContent, index_name: &str) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoPartitioner;

    #[async_trait]
    impl TextPartitioningService for EchoPartitioner {
        async fn partition(&self, text: &str) -> Result<Vec<String>> {
            Ok(vec![text.to_string()])
        }
    }

    #[tokio::test]
    async fn test_factory_resolves_registered_profile() {
        let mut factory: MapServiceFactory<dyn TextPartitioningService> = MapServiceFactory::new();
        factory.register(
            ServiceProfile::new("default-partitioner").with_setting("chunk_size", "500"),
            Arc::new(EchoPartitioner),
        );

        let (service, profile) = factory
            .get_service_with_profile("default-partitioner")
            .await
            .unwrap();
        assert_eq!(profile.required_setting("chunk_size").unwrap(), "500");
        assert_eq!(service.partition("abc").await.unwrap(), vec!["abc"]);
    }

    #[tokio::test]
    async fn test_factory_rejects_unknown_profile() {
        let factory: MapServiceFactory<dyn TextPartitioningService> = MapServiceFactory::new();
        let err = factory
            .get_service_with_profile("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedService(name) if name == "missing"));
    }

    #[test]
    fn test_required_setting_missing_is_configuration_error() {
        let profile = ServiceProfile::new("p");
        let err = profile.required_setting("index_name").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_embedding_serde_is_transparent() {
        let embedding = Embedding(vec![0.1, 0.2]);
        let json = serde_json::to_string(&embedding).unwrap();
        assert_eq!(json, "[0.1,0.2]");
    }
}
