use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use lexiforge_core::{LexiforgeError, UsageStats};
use lexiforge_llm::{ProviderAdapter, ProviderCall, ProviderRegistry, ProviderReply};

struct Named(&'static str);

#[async_trait]
impl ProviderAdapter for Named {
    fn name(&self) -> &str {
        self.0
    }

    async fn issue_call(&self, _call: ProviderCall<'_>) -> Result<ProviderReply, LexiforgeError> {
        Err(LexiforgeError::transport(self.0, "not used"))
    }

    fn extract_usage(&self, _raw: &Value) -> UsageStats {
        UsageStats::default()
    }
}

#[test]
fn known_prefixes_route_to_their_provider() {
    let registry = ProviderRegistry::with_default_routes();

    for (model, provider) in [
        ("gpt-4o-mini", "openai"),
        ("o4-mini", "openai"),
        ("gemini-2.5-flash", "google"),
        ("models/gemini-2.0-flash", "google"),
        ("claude-sonnet-4-20250514", "anthropic"),
        ("deepseek-chat", "deepseek"),
        ("GPT-4.1", "openai"),
    ] {
        let selection = registry.select(model);
        assert_eq!(selection.provider, provider, "model {model}");
        assert!(selection.matched_prefix.is_some());
    }
}

#[test]
fn unknown_prefix_falls_back_to_default() {
    let registry = ProviderRegistry::with_default_routes();

    let selection = registry.select("mistral-large");

    assert_eq!(selection.provider, "openai");
    assert_eq!(selection.matched_prefix, None);
}

#[test]
fn longest_prefix_wins() {
    let registry = ProviderRegistry::new("openai")
        .route("gemini", "google")
        .route("gemini-local", "ollama");

    assert_eq!(registry.select("gemini-local-7b").provider, "ollama");
    assert_eq!(registry.select("gemini-2.5-pro").provider, "google");
}

#[test]
fn resolve_uses_registered_adapter() {
    let registry = ProviderRegistry::with_default_routes()
        .register(Arc::new(Named("openai")))
        .register(Arc::new(Named("google")));

    assert_eq!(registry.resolve("gemini-2.5-flash").unwrap().name(), "google");
    assert_eq!(registry.resolve("llama-3").unwrap().name(), "openai");
    assert!(registry.has_provider("google"));
    assert!(!registry.has_provider("anthropic"));
}

#[test]
fn resolve_without_adapter_is_a_configuration_error() {
    let registry = ProviderRegistry::with_default_routes().register(Arc::new(Named("openai")));

    let err = registry.resolve("claude-3-5-haiku").err().expect("missing adapter");

    assert!(err.is_configuration());
}
