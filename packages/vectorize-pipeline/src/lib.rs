/*
 * Vectorize Pipeline - Resumable Content Vectorization
 *
 * Drives content through extract -> partition -> embed -> index against
 * durable state, so any step can be retried or resumed without redoing
 * completed work.
 *
 * Architecture:
 * - Step Handlers (idempotent, keyed artifact arena)
 * - Pipeline Orchestrator (resume from persisted state)
 * - Backend Service Ports (content source, partitioning, embedding, index)
 * - Orchestration Service Manager (internal + discovered external services)
 */

// Public modules
pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod retry;
pub mod service_manager;
pub mod services;

// Re-exports
pub use error::{PipelineError, Result};
pub use handlers::{
    EmbeddingHandler, ExtractionHandler, IndexingHandler, PartitionHandler, StepHandler,
};
pub use orchestrator::{PipelineOrchestrator, RequestOutcome};
pub use service_manager::{
    ApiEndpointConfiguration, EndpointCategory, OrchestrationService,
    OrchestrationServiceManager, RemoteOrchestrationService, ResourceConfiguration,
    ServiceHealth, ServiceStatus,
};
pub use services::{
    ContentSourceService, EmbeddedContent, EmbeddedContentPart, Embedding, IndexingService,
    MapServiceFactory, ServiceProfile, TextEmbeddingService, TextPartitioningService,
    VectorizationServiceFactory,
};
