//! TTL-bound result cache persisted as one JSON document per language pair.

mod cache;
mod config;
mod store;

pub use cache::{CacheStats, ResultCache};
pub use config::{CacheConfig, MAX_TTL};
pub use store::CacheRow;
