//! OpenAI-compatible chat completions adapter
//!
//! Covers OpenAI itself and any vendor speaking the same wire format
//! (DeepSeek, Together, local gateways).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use lexiforge_core::{LexiforgeError, Message, UsageStats};

use crate::adapter::{
    http_client, parse_json_payload, read_json_body, validate_base_url, ProviderAdapter,
    ProviderCall, ProviderReply,
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

#[derive(Clone)]
pub struct OpenAiCompatibleAdapter {
    name: String,
    base_url: String,
    api_key: SecretString,
    http: Client,
}

impl fmt::Debug for OpenAiCompatibleAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleAdapter")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OpenAiCompatibleAdapter {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, LexiforgeError> {
        let name = name.into();
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LexiforgeError::Configuration(format!(
                "{name} api key is empty"
            )));
        }
        Ok(Self {
            base_url: validate_base_url(&name, base_url)?,
            http: http_client(&name, Duration::from_secs(120))?,
            api_key: SecretString::new(api_key),
            name,
        })
    }

    pub fn openai(api_key: impl Into<String>) -> Result<Self, LexiforgeError> {
        Self::new("openai", OPENAI_BASE_URL, api_key)
    }

    pub fn deepseek(api_key: impl Into<String>) -> Result<Self, LexiforgeError> {
        Self::new("deepseek", DEEPSEEK_BASE_URL, api_key)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LexiforgeError> {
        self.http = http_client(&self.name, timeout)?;
        Ok(self)
    }
}

#[derive(Serialize, Debug)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: Value,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct UsageBlock {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionDetails>,
}

#[derive(Deserialize, Debug, Default)]
struct PromptDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Deserialize, Debug, Default)]
struct CompletionDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

/// OpenAI restricts schema names to `[a-zA-Z0-9_-]{1,64}`.
fn schema_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "response".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn issue_call(&self, call: ProviderCall<'_>) -> Result<ProviderReply, LexiforgeError> {
        let request = ChatCompletionRequest {
            model: call.model,
            messages: call.messages,
            temperature: call.temperature,
            max_tokens: call.max_tokens,
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema_name(&call.schema.name),
                    "schema": call.schema.schema,
                    "strict": false
                }
            }),
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|err| LexiforgeError::transport(&self.name, err.to_string()))?;
        let raw = read_json_body(&self.name, response).await?;

        let parsed: ChatCompletionResponse = serde_json::from_value(raw.clone())
            .map_err(|err| LexiforgeError::transport(&self.name, err.to_string()))?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| LexiforgeError::transport(&self.name, "no choices returned"))?;

        if let Some(refusal) = message.refusal {
            return Err(LexiforgeError::validation(
                format!("{} refused the request", self.name),
                refusal,
            ));
        }
        let content = message.content.unwrap_or_default();
        let payload = parse_json_payload(&self.name, &content)?;
        Ok(ProviderReply { payload, raw })
    }

    fn extract_usage(&self, raw: &Value) -> UsageStats {
        let usage: UsageBlock = raw
            .get("usage")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        UsageStats {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cached_tokens: usage
                .prompt_tokens_details
                .map_or(0, |details| details.cached_tokens),
            reasoning_tokens: usage
                .completion_tokens_details
                .map_or(0, |details| details.reasoning_tokens),
        }
    }
}
