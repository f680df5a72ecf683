use std::path::PathBuf;
use std::str::FromStr;

use lexiforge_core::LexiforgeError;

/// Upper bound on concurrent workers regardless of configuration.
pub const MAX_WORKERS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Item-level attempts, each of which may spend the client's own retries.
    pub max_item_attempts: u32,
    pub workers: usize,
    /// Completions between checkpoint flushes.
    pub checkpoint_interval: usize,
    pub review_dir: PathBuf,
    pub checkpoint_path: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_item_attempts: 2,
            workers: 4,
            checkpoint_interval: 10,
            review_dir: PathBuf::from("manual_review"),
            checkpoint_path: PathBuf::from("checkpoint.json"),
        }
    }
}

impl BatchConfig {
    pub fn with_max_item_attempts(mut self, attempts: u32) -> Self {
        self.max_item_attempts = attempts;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_review_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.review_dir = dir.into();
        self
    }

    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = path.into();
        self
    }

    pub fn effective_workers(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }

    pub fn validate(&self) -> Result<(), LexiforgeError> {
        if self.max_item_attempts == 0 {
            return Err(LexiforgeError::Configuration(
                "max_item_attempts must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(LexiforgeError::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.checkpoint_interval == 0 {
            return Err(LexiforgeError::Configuration(
                "checkpoint_interval must be at least 1".to_string(),
            ));
        }
        if self.workers > MAX_WORKERS {
            tracing::warn!(
                requested = self.workers,
                cap = MAX_WORKERS,
                "worker count above cap; clamping"
            );
        }
        Ok(())
    }

    /// Overrides defaults from `LEXIFORGE_*` environment variables.
    pub fn from_env() -> Result<Self, LexiforgeError> {
        let mut config = Self::default();
        if let Some(value) = env_parse("LEXIFORGE_MAX_ITEM_ATTEMPTS")? {
            config.max_item_attempts = value;
        }
        if let Some(value) = env_parse("LEXIFORGE_WORKERS")? {
            config.workers = value;
        }
        if let Some(value) = env_parse("LEXIFORGE_CHECKPOINT_INTERVAL")? {
            config.checkpoint_interval = value;
        }
        if let Ok(dir) = std::env::var("LEXIFORGE_REVIEW_DIR") {
            config.review_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("LEXIFORGE_CHECKPOINT_PATH") {
            config.checkpoint_path = PathBuf::from(path);
        }
        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, LexiforgeError> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            LexiforgeError::Configuration(format!("{name} has an invalid value: '{raw}'"))
        }),
        Err(_) => Ok(None),
    }
}
