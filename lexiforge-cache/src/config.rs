use std::path::{Path, PathBuf};
use std::time::Duration;

use lexiforge_core::LexiforgeError;

const DAY_SECS: u64 = 24 * 60 * 60;
const DEFAULT_TTL: Duration = Duration::from_secs(30 * DAY_SECS);

/// Longest accepted TTL, one hundred years.
pub const MAX_TTL: Duration = Duration::from_secs(36_500 * DAY_SECS);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub ttl: Duration,
}

impl CacheConfig {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), LexiforgeError> {
        if self.ttl.is_zero() {
            return Err(LexiforgeError::Configuration(
                "cache ttl must be greater than zero".to_string(),
            ));
        }
        if self.ttl > MAX_TTL {
            return Err(LexiforgeError::Configuration(format!(
                "cache ttl of {}s exceeds the maximum of {}s",
                self.ttl.as_secs(),
                MAX_TTL.as_secs()
            )));
        }
        if self.dir.as_os_str().is_empty() {
            return Err(LexiforgeError::Configuration(
                "cache directory is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// `LEXIFORGE_CACHE_DIR` and `LEXIFORGE_CACHE_TTL_DAYS`, falling back to
    /// `./cache` and thirty days.
    pub fn from_env() -> Result<Self, LexiforgeError> {
        let dir = std::env::var("LEXIFORGE_CACHE_DIR").unwrap_or_else(|_| "cache".to_string());
        let mut config = Self::new(dir);
        if let Ok(days) = std::env::var("LEXIFORGE_CACHE_TTL_DAYS") {
            let days: u64 = days.trim().parse().map_err(|_| {
                LexiforgeError::Configuration(format!(
                    "LEXIFORGE_CACHE_TTL_DAYS is not a whole number: '{days}'"
                ))
            })?;
            let secs = days.checked_mul(DAY_SECS).ok_or_else(|| {
                LexiforgeError::Configuration(format!(
                    "LEXIFORGE_CACHE_TTL_DAYS is too large: {days}"
                ))
            })?;
            config.ttl = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }
}
