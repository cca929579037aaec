//! Vectorization artifacts
//!
//! An artifact is one typed, positioned output fragment of a pipeline step.
//! Positions are ordinals unique within a `(content, type)` pair; the dirty
//! flag marks content that has not been written to durable storage since its
//! last mutation.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Artifact type (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    ExtractedText,
    TextPartition,
    TextEmbeddingVector,
    IndexedEntry,
}

impl ArtifactType {
    /// Lowercase name used in persisted artifact paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::ExtractedText => "extractedtext",
            ArtifactType::TextPartition => "textpartition",
            ArtifactType::TextEmbeddingVector => "textembeddingvector",
            ArtifactType::IndexedEntry => "indexedentry",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "extractedtext" => Ok(ArtifactType::ExtractedText),
            "textpartition" => Ok(ArtifactType::TextPartition),
            "textembeddingvector" => Ok(ArtifactType::TextEmbeddingVector),
            "indexedentry" => Ok(ArtifactType::IndexedEntry),
            _ => Err(StateError::config(format!("Unknown artifact type: {}", s))),
        }
    }
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One output fragment of a pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationArtifact {
    pub artifact_type: ArtifactType,
    /// Ordinal, unique within the `(content, type)` pair
    pub position: u32,
    /// Raw payload; never serialized into the state envelope, hydrated on
    /// demand from the body file at `canonical_id`
    #[serde(skip)]
    pub content: Option<String>,
    /// Durable storage path of the body file; empty until first persisted
    #[serde(default)]
    pub canonical_id: String,
    /// True until the content has been written since its last mutation
    #[serde(skip)]
    pub dirty: bool,
}

impl VectorizationArtifact {
    /// Create a freshly produced artifact (dirty, not yet persisted).
    pub fn new(artifact_type: ArtifactType, position: u32, content: impl Into<String>) -> Self {
        Self {
            artifact_type,
            position,
            content: Some(content.into()),
            canonical_id: String::new(),
            dirty: true,
        }
    }

    /// Arena key within a state's artifact set.
    pub fn key(&self) -> (ArtifactType, u32) {
        (self.artifact_type, self.position)
    }

    /// Replace the content and mark the artifact dirty.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = Some(content.into());
        self.dirty = true;
    }
}
