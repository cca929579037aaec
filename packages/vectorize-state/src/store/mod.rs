//! Durable state persistence
//!
//! # Port Trait
//!
//! - `StorageClient`: byte-level storage abstraction (container + path)
//!
//! # Adapters
//!
//! - `MemoryStorage`: in-process, for tests and embedded use
//! - `FileStorage`: local filesystem, containers as subdirectories
//!
//! # Layout
//!
//! Everything lives in the `vectorization-state` container:
//!
//! ```text
//! execution-state/<persistence-id>.json                  state envelope
//! execution-state/<persistence-id>_<type>_<pos:06>.txt   artifact body
//! pipeline-state/<name>/<name>-<execution-id>.json       pipeline execution
//! ```
//!
//! Artifact bodies are written before the envelope, so a crash mid-save
//! leaves at worst orphaned body files, never an envelope pointing at
//! missing bodies.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::artifact::ArtifactType;
use crate::content::ContentIdentifier;
use crate::error::{Result, StateError};
use crate::state::{VectorizationPipelineState, VectorizationState};

/// Container holding all vectorization state
pub const STATE_CONTAINER_NAME: &str = "vectorization-state";

const EXECUTION_STATE_DIRECTORY: &str = "execution-state";
const PIPELINE_STATE_DIRECTORY: &str = "pipeline-state";

// ═══════════════════════════════════════════════════════════════════════════
// Storage Port
// ═══════════════════════════════════════════════════════════════════════════

/// Byte-level storage abstraction
///
/// The store addresses blobs by `(container, path)`. Adapters decide what a
/// container is (a directory, a map shard, a cloud container).
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Check whether a blob exists.
    async fn exists(&self, container: &str, path: &str) -> Result<bool>;

    /// Read a blob in full.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` when the blob does not exist.
    async fn read(&self, container: &str, path: &str) -> Result<Vec<u8>>;

    /// Write a blob, replacing any existing content.
    async fn write(&self, container: &str, path: &str, data: &[u8]) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════
// State Store
// ═══════════════════════════════════════════════════════════════════════════

/// Durable store for vectorization and pipeline state
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use vectorize_state::{MemoryStorage, StateStore};
///
/// let store = StateStore::new(Arc::new(MemoryStorage::new()));
/// ```
pub struct StateStore {
    storage: Arc<dyn StorageClient>,
}

impl StateStore {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self { storage }
    }

    /// Check whether persisted state exists for a content identifier.
    pub async fn has_state(
        &self,
        content_identifier: &ContentIdentifier,
        token: &CancellationToken,
    ) -> Result<bool> {
        ensure_active(token)?;
        let path = state_path(&content_identifier.persistence_id());
        self.storage.exists(STATE_CONTAINER_NAME, &path).await
    }

    /// Read the state envelope for a content identifier.
    ///
    /// Artifact bodies are not hydrated; call [`StateStore::load_artifacts`]
    /// for the types a caller needs.
    ///
    /// # Errors
    ///
    /// - `ErrorKind::NotFound` when no state has been persisted
    /// - `ErrorKind::Serialization` when the envelope cannot be parsed
    pub async fn read_state(
        &self,
        content_identifier: &ContentIdentifier,
        token: &CancellationToken,
    ) -> Result<VectorizationState> {
        ensure_active(token)?;
        let persistence_id = content_identifier.persistence_id();
        let path = state_path(&persistence_id);

        if !self.storage.exists(STATE_CONTAINER_NAME, &path).await? {
            return Err(StateError::not_found(format!(
                "No vectorization state for content '{}'",
                content_identifier.unique_id()
            )));
        }

        ensure_active(token)?;
        let bytes = self.storage.read(STATE_CONTAINER_NAME, &path).await?;
        let mut state: VectorizationState = serde_json::from_slice(&bytes)?;
        state.version = version_stamp(&bytes);

        debug!(
            persistence_id = %persistence_id,
            artifacts = state.artifacts.len(),
            "Loaded vectorization state"
        );
        Ok(state)
    }

    /// Hydrate artifact bodies of one type from durable storage.
    ///
    /// Only artifacts with a non-empty canonical id are touched; freshly
    /// produced, never-persisted artifacts keep their in-memory content.
    pub async fn load_artifacts(
        &self,
        state: &mut VectorizationState,
        artifact_type: ArtifactType,
        token: &CancellationToken,
    ) -> Result<()> {
        for artifact in state.artifacts_of_type_mut(artifact_type) {
            if artifact.canonical_id.is_empty() {
                continue;
            }
            ensure_active(token)?;
            let bytes = self
                .storage
                .read(STATE_CONTAINER_NAME, &artifact.canonical_id)
                .await?;
            let text = String::from_utf8(bytes).map_err(|e| {
                StateError::serialization(format!(
                    "Artifact body at '{}' is not UTF-8",
                    artifact.canonical_id
                ))
                .with_source(e)
            })?;
            artifact.content = Some(text);
            artifact.dirty = false;
        }
        Ok(())
    }

    /// Persist the state: dirty artifact bodies first, then the envelope.
    ///
    /// Concurrent modification is detected via a content hash of the durable
    /// envelope, checked before anything is written: a save whose envelope
    /// on storage no longer matches the one this state was loaded from fails
    /// with `ErrorKind::Concurrency` without touching any body files. On
    /// success `state.version` is re-stamped to the written envelope.
    ///
    /// Not atomic: a failure after the body writes leaves bodies durable and
    /// the envelope stale. Re-running the producing step overwrites the same
    /// body paths, so this is safe under the keyed-artifact contract.
    pub async fn save_state(
        &self,
        state: &mut VectorizationState,
        token: &CancellationToken,
    ) -> Result<()> {
        ensure_active(token)?;
        let persistence_id = state.content_identifier.persistence_id();

        let envelope_path = state_path(&persistence_id);
        let existing = if self
            .storage
            .exists(STATE_CONTAINER_NAME, &envelope_path)
            .await?
        {
            Some(self.storage.read(STATE_CONTAINER_NAME, &envelope_path).await?)
        } else {
            None
        };

        let durable_version = existing.as_deref().map(version_stamp);
        let conflict = match &durable_version {
            Some(durable) => *durable != state.version,
            None => !state.version.is_empty(),
        };
        if conflict {
            return Err(StateError::concurrency(format!(
                "Vectorization state for content '{}' was modified by another writer",
                state.content_identifier.unique_id()
            )));
        }

        for artifact in &mut state.artifacts {
            if !artifact.dirty {
                continue;
            }
            ensure_active(token)?;
            let body_path = artifact_path(&persistence_id, artifact.artifact_type, artifact.position);
            let body = artifact.content.as_deref().unwrap_or_default();
            self.storage
                .write(STATE_CONTAINER_NAME, &body_path, body.as_bytes())
                .await?;
            artifact.canonical_id = body_path;
            artifact.dirty = false;
        }

        ensure_active(token)?;
        let bytes = serde_json::to_vec_pretty(&state)?;
        self.storage
            .write(STATE_CONTAINER_NAME, &envelope_path, &bytes)
            .await?;
        state.version = version_stamp(&bytes);

        debug!(
            persistence_id = %persistence_id,
            artifacts = state.artifacts.len(),
            "Saved vectorization state"
        );
        Ok(())
    }

    /// Persist the state of one pipeline execution.
    pub async fn save_pipeline_state(
        &self,
        state: &VectorizationPipelineState,
        token: &CancellationToken,
    ) -> Result<()> {
        ensure_active(token)?;
        let path = pipeline_path(state.pipeline_name(), &state.execution_id);
        let bytes = serde_json::to_vec_pretty(state)?;
        self.storage
            .write(STATE_CONTAINER_NAME, &path, &bytes)
            .await?;

        debug!(
            pipeline = state.pipeline_name(),
            execution_id = %state.execution_id,
            status = state.status.as_str(),
            "Saved pipeline execution state"
        );
        Ok(())
    }

    /// Read the state of one pipeline execution.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` when the execution was never persisted.
    pub async fn read_pipeline_state(
        &self,
        pipeline_name: &str,
        execution_id: &str,
        token: &CancellationToken,
    ) -> Result<VectorizationPipelineState> {
        ensure_active(token)?;
        let path = pipeline_path(pipeline_name, execution_id);

        if !self.storage.exists(STATE_CONTAINER_NAME, &path).await? {
            return Err(StateError::not_found(format!(
                "No state for execution '{execution_id}' of pipeline '{pipeline_name}'"
            )));
        }

        let bytes = self.storage.read(STATE_CONTAINER_NAME, &path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Path Grammar
// ═══════════════════════════════════════════════════════════════════════════

fn state_path(persistence_id: &str) -> String {
    format!("{EXECUTION_STATE_DIRECTORY}/{persistence_id}.json")
}

fn artifact_path(persistence_id: &str, artifact_type: ArtifactType, position: u32) -> String {
    format!(
        "{EXECUTION_STATE_DIRECTORY}/{persistence_id}_{}_{position:06}.txt",
        artifact_type.as_str()
    )
}

fn pipeline_path(pipeline_name: &str, execution_id: &str) -> String {
    format!("{PIPELINE_STATE_DIRECTORY}/{pipeline_name}/{pipeline_name}-{execution_id}.json")
}

fn version_stamp(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn ensure_active(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(StateError::cancelled("State operation cancelled"));
    }
    Ok(())
}
