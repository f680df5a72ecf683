mod clock;
mod error;
mod generation;
mod hash;
pub mod prelude;
mod retry;
mod usage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LexiforgeError;
pub use generation::{GenerationRequest, GenerationResponse, Message, OutputSchema, Role};
pub use hash::{fingerprint, prompt_hash};
pub use retry::{
    backoff_delay, retry_with_policy, AttemptOutcome, Retried, RetryPolicy, RetryState,
};
pub use usage::{ModelPricing, UsageSnapshot, UsageStats, UsageTracker};
