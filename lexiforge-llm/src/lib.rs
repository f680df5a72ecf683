//! Provider adapters and the retrying generation client.
//!
//! ```ignore
//! use lexiforge_llm::{GenerationClient, ProviderRegistry};
//!
//! let client = GenerationClient::builder()
//!     .registry(ProviderRegistry::from_env()?)
//!     .model("gpt-4o-mini")
//!     .max_retries(3)
//!     .build()?;
//! ```

mod adapter;
mod client;
pub mod providers;
mod registry;

pub use adapter::{
    classify_http_failure, parse_json_payload, ProviderAdapter, ProviderCall, ProviderReply,
};
pub use client::{GenerationClient, GenerationClientBuilder};
pub use registry::{ProviderRegistry, ProviderSelection};

#[cfg(feature = "anthropic")]
pub use providers::anthropic::AnthropicAdapter;
#[cfg(feature = "google")]
pub use providers::google::GeminiAdapter;
#[cfg(feature = "openai")]
pub use providers::openai::OpenAiCompatibleAdapter;

pub use lexiforge_core::{
    GenerationRequest, GenerationResponse, LexiforgeError, Message, OutputSchema, RetryPolicy,
    Role, UsageSnapshot, UsageStats,
};
