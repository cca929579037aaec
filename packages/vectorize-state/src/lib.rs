//! Vectorize State - Durable Vectorization State
//!
//! Models and persistence for a resumable content vectorization pipeline.
//!
//! ## Core Principles
//!
//! 1. **State per content**: one durable envelope per content identifier,
//!    keyed by its persistence id
//! 2. **Keyed artifacts**: step outputs live in an arena keyed by
//!    `(type, position)`; re-producing an output replaces it in place
//! 3. **Bodies before envelope**: artifact bodies are durable before the
//!    envelope that references them
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vectorize_state::{
//!     ContentIdentifier, MemoryStorage, StateStore, VectorizationState,
//! };
//!
//! let store = StateStore::new(Arc::new(MemoryStorage::new()));
//! let token = CancellationToken::new();
//!
//! let id = ContentIdentifier::new(
//!     vec!["https://account/docs".into(), "guide.pdf".into()],
//!     "docs-profile",
//!     "SomeBusinessUnit",
//!     "SomePDFData",
//! );
//!
//! let mut state = VectorizationState::new(id.clone(), "request-id");
//! store.save_state(&mut state, &token).await?;
//! assert!(store.has_state(&id, &token).await?);
//! ```

// Public modules
pub mod artifact;
pub mod content;
pub mod error;
pub mod request;
pub mod state;
pub mod store;

// Re-exports
pub use artifact::{ArtifactType, VectorizationArtifact};
pub use content::ContentIdentifier;
pub use error::{ErrorKind, Result, StateError};
pub use request::{
    EmbedConfig, ExtractConfig, IndexConfig, PartitionConfig, ProcessingType, StepName,
    VectorizationRequest, VectorizationStep,
};
pub use state::{PipelineExecutionStatus, VectorizationPipelineState, VectorizationState};
pub use store::{
    FileStorage, MemoryStorage, StateStore, StorageClient, STATE_CONTAINER_NAME,
};
