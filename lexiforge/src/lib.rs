//! Resilient, resumable LLM enrichment pipelines.
//!
//! This crate re-exports the workspace crates behind features:
//!
//! - `llm` (plus `openai`, `google`, `anthropic`): generation client and adapters
//! - `cache`: TTL-bound result cache
//! - `batch`: checkpointed batch orchestrator and manual review sinks
//!
//! Most programs only need the [`prelude`].

pub mod prelude;

pub use lexiforge_core as core;
pub use lexiforge_core::{
    fingerprint, prompt_hash, AttemptOutcome, Clock, GenerationRequest, GenerationResponse,
    LexiforgeError, ManualClock, Message, ModelPricing, OutputSchema, RetryPolicy, Role,
    SystemClock, UsageSnapshot, UsageStats,
};

#[cfg(feature = "llm")]
pub use lexiforge_llm as llm;

#[cfg(feature = "cache")]
pub use lexiforge_cache as cache;

#[cfg(feature = "batch")]
pub use lexiforge_batch as batch;
