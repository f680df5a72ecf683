//! Anthropic Messages API adapter
//!
//! Structured output is obtained by forcing a single tool whose input schema
//! is the requested output schema.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use lexiforge_core::{LexiforgeError, Role, UsageStats};

use crate::adapter::{
    http_client, parse_json_payload, read_json_body, validate_base_url, ProviderAdapter,
    ProviderCall, ProviderReply,
};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const PROVIDER: &str = "anthropic";

#[derive(Clone)]
pub struct AnthropicAdapter {
    base_url: String,
    api_key: SecretString,
    http: Client,
}

impl fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl AnthropicAdapter {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LexiforgeError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LexiforgeError::Configuration(
                "anthropic api key is empty".to_string(),
            ));
        }
        Ok(Self {
            base_url: ANTHROPIC_BASE_URL.to_string(),
            api_key: SecretString::new(api_key),
            http: http_client(PROVIDER, Duration::from_secs(120))?,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, LexiforgeError> {
        self.base_url = validate_base_url(PROVIDER, base_url)?;
        Ok(self)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    tools: Vec<Value>,
    tool_choice: Value,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { input: Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Default)]
struct UsageBlock {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

fn tool_name(schema_name: &str) -> String {
    let cleaned: String = schema_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "emit_response".to_string()
    } else {
        cleaned
    }
}

fn build_request<'a>(call: &ProviderCall<'a>) -> MessagesRequest<'a> {
    let system: Vec<&str> = call
        .messages
        .iter()
        .filter(|message| message.role == Role::System)
        .map(|message| message.content.as_str())
        .collect();
    let messages = call
        .messages
        .iter()
        .filter_map(|message| match message.role {
            Role::System => None,
            Role::User => Some(AnthropicMessage {
                role: "user",
                content: &message.content,
            }),
            Role::Assistant => Some(AnthropicMessage {
                role: "assistant",
                content: &message.content,
            }),
        })
        .collect();
    let name = tool_name(&call.schema.name);

    MessagesRequest {
        model: call.model,
        max_tokens: call.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages,
        temperature: call.temperature,
        tools: vec![json!({
            "name": name,
            "description": format!("Return the {} object.", call.schema.name),
            "input_schema": call.schema.schema,
        })],
        tool_choice: json!({"type": "tool", "name": name}),
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn issue_call(&self, call: ProviderCall<'_>) -> Result<ProviderReply, LexiforgeError> {
        let request = build_request(&call);

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|err| LexiforgeError::transport(PROVIDER, err.to_string()))?;
        let raw = read_json_body(PROVIDER, response).await?;

        let parsed: MessagesResponse = serde_json::from_value(raw.clone())
            .map_err(|err| LexiforgeError::transport(PROVIDER, err.to_string()))?;

        let mut text = String::new();
        for block in parsed.content {
            match block {
                ContentBlock::ToolUse { input } => {
                    return Ok(ProviderReply {
                        payload: input,
                        raw,
                    })
                }
                ContentBlock::Text { text: chunk } => text.push_str(&chunk),
                ContentBlock::Other => {}
            }
        }

        let payload = parse_json_payload(PROVIDER, &text)?;
        Ok(ProviderReply { payload, raw })
    }

    fn extract_usage(&self, raw: &Value) -> UsageStats {
        let usage: UsageBlock = raw
            .get("usage")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        UsageStats {
            prompt_tokens: usage.input_tokens + usage.cache_read_input_tokens,
            completion_tokens: usage.output_tokens,
            cached_tokens: usage.cache_read_input_tokens,
            reasoning_tokens: 0,
        }
    }
}
