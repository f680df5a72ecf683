//! Provider-specific adapters

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "google")]
pub mod google;

#[cfg(feature = "anthropic")]
pub mod anthropic;
