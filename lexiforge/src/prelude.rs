pub use lexiforge_core::{
    GenerationRequest, GenerationResponse, LexiforgeError, Message, ModelPricing, OutputSchema,
    RetryPolicy, Role, UsageSnapshot, UsageStats,
};

#[cfg(feature = "llm")]
pub use lexiforge_llm::{
    GenerationClient, ProviderAdapter, ProviderCall, ProviderRegistry, ProviderReply,
};

#[cfg(feature = "anthropic")]
pub use lexiforge_llm::AnthropicAdapter;
#[cfg(feature = "google")]
pub use lexiforge_llm::GeminiAdapter;
#[cfg(feature = "openai")]
pub use lexiforge_llm::OpenAiCompatibleAdapter;

#[cfg(feature = "cache")]
pub use lexiforge_cache::{CacheConfig, ResultCache};

#[cfg(feature = "batch")]
pub use lexiforge_batch::{
    BatchConfig, BatchOrchestrator, BatchOutcome, BatchStats, CacheQuery, CancellationToken,
    CheckpointEntry, CheckpointStore, EnrichmentItem, EnrichmentTask, FileCheckpointStore,
    FileReviewSink, InMemoryCheckpointStore, InMemoryReviewSink, ManualReviewRecord, ReviewSink,
};
