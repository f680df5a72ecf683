// Prelude module for lexiforge-core
//
// Import commonly used types with: `use lexiforge_core::prelude::*;`

pub use crate::{
    // Retry machinery
    AttemptOutcome,
    // Time
    Clock,
    // Generation primitives
    GenerationRequest,
    GenerationResponse,
    // Errors
    LexiforgeError,
    Message,
    OutputSchema,
    RetryPolicy,
    Role,
    SystemClock,
    // Accounting
    UsageStats,
    UsageTracker,
};
