//! Google Gemini `generateContent` adapter

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lexiforge_core::{LexiforgeError, Message, Role, UsageStats};

use crate::adapter::{
    http_client, parse_json_payload, read_json_body, validate_base_url, ProviderAdapter,
    ProviderCall, ProviderReply,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const PROVIDER: &str = "google";

#[derive(Clone)]
pub struct GeminiAdapter {
    base_url: String,
    api_key: SecretString,
    http: Client,
}

impl fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiAdapter {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LexiforgeError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LexiforgeError::Configuration(
                "google api key is empty".to_string(),
            ));
        }
        Ok(Self {
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: SecretString::new(api_key),
            http: http_client(PROVIDER, Duration::from_secs(120))?,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, LexiforgeError> {
        self.base_url = validate_base_url(PROVIDER, base_url)?;
        Ok(self)
    }

    fn generate_url(&self, model: &str) -> String {
        let model = model.trim();
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_json_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    cached_content_token_count: u64,
    #[serde(default)]
    thoughts_token_count: u64,
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
    }
}

fn build_request(call: &ProviderCall<'_>) -> GenerateContentRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();
    for message in call.messages {
        match message.role {
            Role::System => system_parts.push(text_part(&message.content)),
            Role::User => contents.push(Content {
                role: Some("user".to_string()),
                parts: vec![text_part(&message.content)],
            }),
            Role::Assistant => contents.push(Content {
                role: Some("model".to_string()),
                parts: vec![text_part(&message.content)],
            }),
        }
    }

    GenerateContentRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| Content {
            role: None,
            parts: system_parts,
        }),
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_json_schema: call.schema.schema.clone(),
            temperature: call.temperature,
            max_output_tokens: call.max_tokens,
        },
    }
}

fn is_blocked_finish_reason(reason: &str) -> bool {
    matches!(reason, "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")
}

fn prompt_chars(messages: &[Message]) -> usize {
    messages.iter().map(|message| message.content.len()).sum()
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn issue_call(&self, call: ProviderCall<'_>) -> Result<ProviderReply, LexiforgeError> {
        let request = build_request(&call);
        tracing::trace!(
            model = call.model,
            prompt_chars = prompt_chars(call.messages),
            "gemini generateContent"
        );

        let response = self
            .http
            .post(self.generate_url(call.model))
            .query(&[("key", self.api_key.expose_secret().as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|err| LexiforgeError::transport(PROVIDER, err.to_string()))?;
        let raw = read_json_body(PROVIDER, response).await?;

        let parsed: GenerateContentResponse = serde_json::from_value(raw.clone())
            .map_err(|err| LexiforgeError::transport(PROVIDER, err.to_string()))?;
        let candidate = parsed
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .ok_or_else(|| LexiforgeError::transport(PROVIDER, "no candidates returned"))?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if is_blocked_finish_reason(reason) {
                return Err(LexiforgeError::validation(
                    format!("gemini blocked the response ({reason})"),
                    String::new(),
                ));
            }
        }

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();
        let payload = parse_json_payload(PROVIDER, &text)?;
        Ok(ProviderReply { payload, raw })
    }

    fn extract_usage(&self, raw: &Value) -> UsageStats {
        let usage: UsageMetadata = raw
            .get("usageMetadata")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        UsageStats {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            cached_tokens: usage.cached_content_token_count,
            reasoning_tokens: usage.thoughts_token_count,
        }
    }
}
