use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::Value;

use lexiforge_core::{
    prompt_hash, retry_with_policy, AttemptOutcome, GenerationRequest, GenerationResponse,
    LexiforgeError, RetryPolicy, UsageSnapshot, UsageStats, UsageTracker,
};

use crate::{ProviderAdapter, ProviderCall, ProviderRegistry};

/// Provider-agnostic structured generation with retry and usage accounting.
///
/// One instance is meant to be built per run and shared by reference (or
/// `Arc`) between workers; the running usage totals live on the instance.
pub struct GenerationClient {
    registry: ProviderRegistry,
    model: String,
    retry: RetryPolicy,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    usage: UsageTracker,
}

impl fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationClient")
            .field("model", &self.model)
            .field("retry", &self.retry)
            .field("registry", &self.registry)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct GenerationClientBuilder {
    registry: Option<ProviderRegistry>,
    model: Option<String>,
    retry: RetryPolicy,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl GenerationClientBuilder {
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Convenience for a registry holding a single adapter used for every model.
    pub fn adapter(self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let name = adapter.name().to_string();
        self.registry(ProviderRegistry::new(name).register(adapter))
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_attempts = max_retries;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Fails when the default model cannot be served: no registry, no model,
    /// an unusable retry policy, or no adapter registered for its provider.
    pub fn build(self) -> Result<GenerationClient, LexiforgeError> {
        let registry = self.registry.ok_or_else(|| {
            LexiforgeError::Configuration("generation client needs a provider registry".into())
        })?;
        let model = self
            .model
            .filter(|model| !model.trim().is_empty())
            .ok_or_else(|| {
                LexiforgeError::Configuration("generation client needs a model".into())
            })?;
        self.retry.validate()?;
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(LexiforgeError::Configuration(format!(
                    "temperature {temperature} outside 0.0..=2.0"
                )));
            }
        }
        registry.resolve(&model)?;

        Ok(GenerationClient {
            registry,
            model,
            retry: self.retry,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            usage: UsageTracker::new(),
        })
    }
}

impl GenerationClient {
    pub fn builder() -> GenerationClientBuilder {
        GenerationClientBuilder::default()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, LexiforgeError> {
        self.generate_checked(request, |_| Ok(())).await
    }

    /// Like [`generate`](Self::generate), but a payload that does not
    /// deserialize into `T` counts as a failed attempt.
    pub async fn generate_typed<T: DeserializeOwned>(
        &self,
        request: &GenerationRequest,
    ) -> Result<(T, GenerationResponse), LexiforgeError> {
        let response = self
            .generate_checked(request, |payload| {
                serde_json::from_value::<T>(payload.clone())
                    .map(|_| ())
                    .map_err(|err| LexiforgeError::validation(err.to_string(), payload.to_string()))
            })
            .await?;
        let value = response.parse()?;
        Ok((value, response))
    }

    async fn generate_checked<F>(
        &self,
        request: &GenerationRequest,
        check: F,
    ) -> Result<GenerationResponse, LexiforgeError>
    where
        F: Fn(&Value) -> Result<(), LexiforgeError>,
    {
        let model = request.model().unwrap_or(&self.model);
        let adapter = self.registry.resolve(model)?;
        let adapter: &dyn ProviderAdapter = adapter.as_ref();
        let messages = request.messages();
        let call = ProviderCall {
            model,
            messages: &messages,
            schema: request.schema(),
            temperature: request.temperature().or(self.temperature),
            max_tokens: request.max_tokens().or(self.max_tokens),
        };
        let hash = prompt_hash(request.prompt());
        let hash = hash.as_str();
        let tracker = &self.usage;
        let check = &check;

        let outcome = retry_with_policy(&self.retry, move |attempt| async move {
            tracker.record_attempt();
            let started = Instant::now();
            let result = adapter.issue_call(call).await.and_then(|reply| {
                request.schema().validate(&reply.payload)?;
                check(&reply.payload)?;
                Ok(reply)
            });
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(reply) => {
                    let usage = adapter.extract_usage(&reply.raw);
                    tracing::info!(
                        provider = adapter.name(),
                        model = model,
                        prompt_hash = hash,
                        attempt = attempt,
                        success = true,
                        latency_ms = latency_ms,
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        cached_tokens = usage.cached_tokens,
                        reasoning_tokens = usage.reasoning_tokens,
                        "generation attempt"
                    );
                    AttemptOutcome::Success((reply.payload, usage))
                }
                Err(error) => {
                    tracing::warn!(
                        provider = adapter.name(),
                        model = model,
                        prompt_hash = hash,
                        attempt = attempt,
                        success = false,
                        latency_ms = latency_ms,
                        error = %error,
                        "generation attempt"
                    );
                    AttemptOutcome::from_result(Err(error))
                }
            }
        })
        .await;

        match outcome {
            Ok(retried) => {
                let (payload, usage): (Value, UsageStats) = retried.value;
                self.usage.record_success(&usage);
                Ok(GenerationResponse {
                    payload,
                    usage,
                    model: model.to_string(),
                    provider: adapter.name().to_string(),
                    attempts: retried.attempts,
                })
            }
            Err(error) => {
                self.usage.record_failure();
                tracing::error!(
                    provider = adapter.name(),
                    model = model,
                    prompt_hash = hash,
                    error = %error,
                    "generation failed"
                );
                Err(error)
            }
        }
    }
}
