use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexiforgeError {
    #[error("Provider '{provider}' call failed: {message}")]
    Transport { provider: String, message: String },
    #[error("Provider '{provider}' quota exhausted: {message}")]
    QuotaExhausted { provider: String, message: String },
    #[error("Validation failed: {reason}")]
    Validation { reason: String, output: String },
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Persistence failed: {0}")]
    Persistence(String),
    #[error("Gave up after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<LexiforgeError>,
    },
    #[error("Operation was cancelled")]
    Cancelled,
    #[error("Serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl LexiforgeError {
    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        LexiforgeError::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn validation(reason: impl Into<String>, output: impl Into<String>) -> Self {
        LexiforgeError::Validation {
            reason: reason.into(),
            output: output.into(),
        }
    }

    /// Transport and validation failures may succeed on a later attempt.
    /// Quota exhaustion and configuration problems never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            LexiforgeError::Transport { .. } | LexiforgeError::Validation { .. } => true,
            LexiforgeError::Serde(_) => true,
            LexiforgeError::RetriesExhausted { source, .. } => source.is_retryable(),
            LexiforgeError::QuotaExhausted { .. }
            | LexiforgeError::Configuration(_)
            | LexiforgeError::Persistence(_)
            | LexiforgeError::Cancelled => false,
        }
    }

    /// The innermost error, looking through retry wrappers.
    pub fn root_cause(&self) -> &LexiforgeError {
        match self {
            LexiforgeError::RetriesExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root_cause(), LexiforgeError::Configuration(_))
    }
}
