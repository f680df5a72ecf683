use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lexiforge_core::LexiforgeError;

use crate::ProviderAdapter;

/// Routing from model identifiers to provider adapters.
///
/// Selection is a longest-prefix match on the lowercased model name. Models
/// matching no prefix fall back to the default provider.
#[derive(Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    routes: Vec<(String, String)>,
    default_provider: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSelection<'a> {
    pub provider: &'a str,
    pub matched_prefix: Option<&'a str>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adapters: Vec<&String> = self.adapters.keys().collect();
        adapters.sort();
        f.debug_struct("ProviderRegistry")
            .field("adapters", &adapters)
            .field("routes", &self.routes)
            .field("default_provider", &self.default_provider)
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_default_routes()
    }
}

impl ProviderRegistry {
    /// Empty registry without routes.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            adapters: HashMap::new(),
            routes: Vec::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Routes for the built-in providers, OpenAI as the fallback.
    pub fn with_default_routes() -> Self {
        Self::new("openai")
            .route("gpt-", "openai")
            .route("chatgpt-", "openai")
            .route("o1", "openai")
            .route("o3", "openai")
            .route("o4", "openai")
            .route("deepseek", "deepseek")
            .route("gemini", "google")
            .route("models/gemini", "google")
            .route("claude", "anthropic")
    }

    pub fn route(mut self, prefix: impl Into<String>, provider: impl Into<String>) -> Self {
        let prefix = prefix.into().to_ascii_lowercase();
        let provider = provider.into();
        self.routes.retain(|(existing, _)| existing != &prefix);
        self.routes.push((prefix, provider));
        self
    }

    /// Registers `adapter` under its own name, replacing any previous one.
    pub fn register(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.name().to_string(), adapter);
        self
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.adapters.contains_key(provider)
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn select(&self, model: &str) -> ProviderSelection<'_> {
        let lowered = model.trim().to_ascii_lowercase();
        self.routes
            .iter()
            .filter(|(prefix, _)| lowered.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, provider)| ProviderSelection {
                provider: provider.as_str(),
                matched_prefix: Some(prefix.as_str()),
            })
            .unwrap_or(ProviderSelection {
                provider: self.default_provider.as_str(),
                matched_prefix: None,
            })
    }

    pub fn resolve(&self, model: &str) -> Result<Arc<dyn ProviderAdapter>, LexiforgeError> {
        let selection = self.select(model);
        if selection.matched_prefix.is_none() {
            tracing::warn!(
                model = model,
                provider = selection.provider,
                "unrecognized model prefix; falling back to default provider"
            );
        }
        self.adapters
            .get(selection.provider)
            .cloned()
            .ok_or_else(|| {
                LexiforgeError::Configuration(format!(
                    "model '{model}' routes to provider '{}' but no adapter is registered \
                     (missing credentials?)",
                    selection.provider
                ))
            })
    }

    /// Registers an adapter for every provider whose API key is present in the
    /// environment.
    pub fn from_env() -> Result<Self, LexiforgeError> {
        #[allow(unused_mut)]
        let mut registry = Self::with_default_routes();

        #[cfg(feature = "openai")]
        {
            use crate::providers::openai::{OpenAiCompatibleAdapter, OPENAI_BASE_URL};

            if let Some(key) = env_key("OPENAI_API_KEY") {
                let base_url =
                    env_key("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_BASE_URL.to_string());
                let adapter = OpenAiCompatibleAdapter::new("openai", &base_url, key)?;
                registry = registry.register(Arc::new(adapter));
            }
            if let Some(key) = env_key("DEEPSEEK_API_KEY") {
                registry = registry.register(Arc::new(OpenAiCompatibleAdapter::deepseek(key)?));
            }
        }

        #[cfg(feature = "google")]
        {
            use crate::providers::google::GeminiAdapter;

            if let Some(key) = env_key("GEMINI_API_KEY").or_else(|| env_key("GOOGLE_API_KEY")) {
                registry = registry.register(Arc::new(GeminiAdapter::new(key)?));
            }
        }

        #[cfg(feature = "anthropic")]
        {
            use crate::providers::anthropic::AnthropicAdapter;

            if let Some(key) = env_key("ANTHROPIC_API_KEY") {
                registry = registry.register(Arc::new(AnthropicAdapter::new(key)?));
            }
        }

        Ok(registry)
    }
}

#[allow(dead_code)]
fn env_key(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
