//! Vectorization state aggregates
//!
//! [`VectorizationState`] is everything known about one piece of content:
//! the artifact arena plus the id of the request currently operating on it.
//! It is created on first request, merged on subsequent requests, mutated in
//! place by handlers, persisted after every step, and never deleted
//! automatically.
//!
//! [`VectorizationPipelineState`] tracks one execution of a named pipeline,
//! persisted per execution id and independent of per-content state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactType, VectorizationArtifact};
use crate::content::ContentIdentifier;
use crate::error::{Result, StateError};

/// Aggregate state for one content identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationState {
    pub content_identifier: ContentIdentifier,
    /// Id of the request currently operating on this state
    #[serde(default)]
    pub current_request_id: String,
    /// Artifact arena, keyed by `(type, position)`
    #[serde(default)]
    pub artifacts: Vec<VectorizationArtifact>,
    /// Optimistic-concurrency stamp of the durable envelope this state was
    /// loaded from (empty for fresh state). Never persisted; the store
    /// recomputes it on read and save.
    #[serde(skip)]
    pub version: String,
}

impl VectorizationState {
    /// Create fresh state for a content identifier.
    pub fn new(content_identifier: ContentIdentifier, current_request_id: impl Into<String>) -> Self {
        Self {
            content_identifier,
            current_request_id: current_request_id.into(),
            artifacts: Vec::new(),
            version: String::new(),
        }
    }

    /// Insert an artifact, replacing any existing artifact at the same
    /// `(type, position)` key.
    ///
    /// This keyed replace is what makes handler re-invocation idempotent: a
    /// step that re-produces its outputs overwrites them in place instead of
    /// appending duplicates.
    pub fn upsert_artifact(&mut self, artifact: VectorizationArtifact) {
        match self.artifacts.iter_mut().find(|a| a.key() == artifact.key()) {
            Some(existing) => *existing = artifact,
            None => self.artifacts.push(artifact),
        }
    }

    /// Artifacts of one type, ordered by position.
    pub fn artifacts_of_type(&self, artifact_type: ArtifactType) -> Vec<&VectorizationArtifact> {
        let mut matching: Vec<_> = self
            .artifacts
            .iter()
            .filter(|a| a.artifact_type == artifact_type)
            .collect();
        matching.sort_by_key(|a| a.position);
        matching
    }

    /// Mutable view of the artifacts of one type.
    pub fn artifacts_of_type_mut(
        &mut self,
        artifact_type: ArtifactType,
    ) -> Vec<&mut VectorizationArtifact> {
        self.artifacts
            .iter_mut()
            .filter(|a| a.artifact_type == artifact_type)
            .collect()
    }

    /// True when at least one artifact of the type exists.
    pub fn has_artifacts(&self, artifact_type: ArtifactType) -> bool {
        self.artifacts
            .iter()
            .any(|a| a.artifact_type == artifact_type)
    }

    /// Next free position for a type (1-based).
    pub fn next_position(&self, artifact_type: ArtifactType) -> u32 {
        self.artifacts
            .iter()
            .filter(|a| a.artifact_type == artifact_type)
            .map(|a| a.position)
            .max()
            .map_or(1, |p| p + 1)
    }
}

/// Status of one pipeline execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineExecutionStatus {
    New,
    InProgress,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl PipelineExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineExecutionStatus::New => "new",
            PipelineExecutionStatus::InProgress => "in_progress",
            PipelineExecutionStatus::Completed => "completed",
            PipelineExecutionStatus::PartiallyCompleted => "partially_completed",
            PipelineExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineExecutionStatus::Completed
                | PipelineExecutionStatus::PartiallyCompleted
                | PipelineExecutionStatus::Failed
        )
    }
}

/// State of one execution of a named pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationPipelineState {
    /// Full pipeline object identifier
    /// (e.g. `/instances/{id}/providers/.../vectorizationPipelines/{name}`)
    pub pipeline_object_id: String,
    /// Execution id, unique per run
    pub execution_id: String,
    pub status: PipelineExecutionStatus,
    /// Content items processed so far in this execution
    #[serde(default)]
    pub processed_count: usize,
    /// Content items that failed in this execution
    #[serde(default)]
    pub error_count: usize,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VectorizationPipelineState {
    /// Create state for a new pipeline execution.
    pub fn new(pipeline_object_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            pipeline_object_id: pipeline_object_id.into(),
            execution_id: execution_id.into(),
            status: PipelineExecutionStatus::New,
            processed_count: 0,
            error_count: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pipeline name, the last segment of the object identifier.
    pub fn pipeline_name(&self) -> &str {
        self.pipeline_object_id
            .rsplit('/')
            .next()
            .unwrap_or(&self.pipeline_object_id)
    }

    fn invalid_transition(&self, to: &str) -> StateError {
        StateError::config(format!(
            "Invalid pipeline execution transition: {} -> {}",
            self.status.as_str(),
            to
        ))
    }

    /// Transition: New → InProgress
    pub fn start(&mut self) -> Result<()> {
        match self.status {
            PipelineExecutionStatus::New => {
                self.status = PipelineExecutionStatus::InProgress;
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(self.invalid_transition("in_progress")),
        }
    }

    /// Transition: InProgress → Completed | PartiallyCompleted
    pub fn complete(&mut self, processed_count: usize, error_count: usize) -> Result<()> {
        match self.status {
            PipelineExecutionStatus::InProgress => {
                self.processed_count = processed_count;
                self.error_count = error_count;
                self.status = if error_count == 0 {
                    PipelineExecutionStatus::Completed
                } else {
                    PipelineExecutionStatus::PartiallyCompleted
                };
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(self.invalid_transition("completed")),
        }
    }

    /// Transition: New | InProgress → Failed
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition("failed"));
        }
        self.status = PipelineExecutionStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identifier() -> ContentIdentifier {
        ContentIdentifier::with_canonical_id(
            vec!["container".to_string(), "file.pdf".to_string()],
            "profile",
            "unit/file",
        )
    }

    #[test]
    fn test_upsert_replaces_same_key() {
        let mut state = VectorizationState::new(identifier(), "req-1");

        state.upsert_artifact(VectorizationArtifact::new(
            ArtifactType::TextPartition,
            1,
            "first",
        ));
        state.upsert_artifact(VectorizationArtifact::new(
            ArtifactType::TextPartition,
            1,
            "replaced",
        ));
        state.upsert_artifact(VectorizationArtifact::new(
            ArtifactType::TextPartition,
            2,
            "second",
        ));

        let partitions = state.artifacts_of_type(ArtifactType::TextPartition);
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].content.as_deref(), Some("replaced"));
        assert_eq!(partitions[1].content.as_deref(), Some("second"));
    }

    #[test]
    fn test_artifacts_of_type_is_position_ordered() {
        let mut state = VectorizationState::new(identifier(), "req-1");
        state.upsert_artifact(VectorizationArtifact::new(ArtifactType::TextPartition, 3, "c"));
        state.upsert_artifact(VectorizationArtifact::new(ArtifactType::TextPartition, 2, "b"));
        state.upsert_artifact(VectorizationArtifact::new(
            ArtifactType::TextEmbeddingVector,
            1,
            "e",
        ));

        let positions: Vec<u32> = state
            .artifacts_of_type(ArtifactType::TextPartition)
            .iter()
            .map(|a| a.position)
            .collect();
        assert_eq!(positions, vec![2, 3]);
    }

    #[test]
    fn test_next_position() {
        let mut state = VectorizationState::new(identifier(), "req-1");
        assert_eq!(state.next_position(ArtifactType::TextPartition), 1);

        state.upsert_artifact(VectorizationArtifact::new(ArtifactType::TextPartition, 4, "x"));
        assert_eq!(state.next_position(ArtifactType::TextPartition), 5);
        assert_eq!(state.next_position(ArtifactType::ExtractedText), 1);
    }

    #[test]
    fn test_pipeline_state_lifecycle() {
        let mut state = VectorizationPipelineState::new(
            "/instances/i1/providers/Vectorization/vectorizationPipelines/docs-pipeline",
            "exec-1",
        );
        assert_eq!(state.pipeline_name(), "docs-pipeline");
        assert_eq!(state.status, PipelineExecutionStatus::New);

        state.start().unwrap();
        assert_eq!(state.status, PipelineExecutionStatus::InProgress);

        state.complete(10, 0).unwrap();
        assert_eq!(state.status, PipelineExecutionStatus::Completed);
        assert_eq!(state.processed_count, 10);
    }

    #[test]
    fn test_pipeline_state_partial_completion() {
        let mut state = VectorizationPipelineState::new("pipelines/p", "exec-2");
        state.start().unwrap();
        state.complete(8, 2).unwrap();
        assert_eq!(state.status, PipelineExecutionStatus::PartiallyCompleted);
        assert_eq!(state.error_count, 2);
    }

    #[test]
    fn test_pipeline_state_invalid_transitions() {
        let mut state = VectorizationPipelineState::new("pipelines/p", "exec-3");

        // Cannot complete before starting
        assert!(state.complete(0, 0).is_err());

        state.start().unwrap();
        state.fail("backend unavailable").unwrap();
        assert_eq!(state.status, PipelineExecutionStatus::Failed);

        // Terminal states reject further transitions
        assert!(state.start().is_err());
        assert!(state.fail("again").is_err());
    }

    #[test]
    fn test_state_serde_skips_version() {
        let mut state = VectorizationState::new(identifier(), "req-1");
        state.version = "abc123".to_string();

        let json = serde_json::to_string(&state).unwrap();
        assert!(!json.contains("abc123"));

        let back: VectorizationState = serde_json::from_str(&json).unwrap();
        assert!(back.version.is_empty());
        assert_eq!(back.current_request_id, "req-1");
    }
}
