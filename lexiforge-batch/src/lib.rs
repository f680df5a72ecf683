//! Checkpointed, resumable batch enrichment on top of the generation client.

mod checkpoint;
mod config;
mod orchestrator;
mod review;
mod sanitize;
mod task;

pub use checkpoint::{
    Checkpoint, CheckpointEntry, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
};
pub use config::{BatchConfig, MAX_WORKERS};
pub use orchestrator::{
    BatchOrchestrator, BatchOrchestratorBuilder, BatchOutcome, BatchStats, ItemState,
};
pub use review::{FileReviewSink, InMemoryReviewSink, ManualReviewRecord, ReviewSink};
pub use task::{CacheQuery, EnrichmentItem, EnrichmentTask};

pub use tokio_util::sync::CancellationToken;
