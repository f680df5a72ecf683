//! Boundary between the generation client and individual vendors.

use async_trait::async_trait;
use serde_json::Value;

use lexiforge_core::{LexiforgeError, Message, OutputSchema, UsageStats};

/// Everything an adapter needs to issue one structured-generation call.
#[derive(Clone, Copy, Debug)]
pub struct ProviderCall<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub schema: &'a OutputSchema,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Parsed payload plus the untouched response body, kept for usage extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderReply {
    pub payload: Value,
    pub raw: Value,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn issue_call(&self, call: ProviderCall<'_>) -> Result<ProviderReply, LexiforgeError>;

    /// Missing counters default to zero.
    fn extract_usage(&self, raw: &Value) -> UsageStats;
}

/// Parses model text as JSON, tolerating a surrounding markdown code fence.
pub fn parse_json_payload(provider: &str, text: &str) -> Result<Value, LexiforgeError> {
    let cleaned = text.trim();
    let cleaned = if cleaned.starts_with("```json") {
        cleaned
            .trim_start_matches("```json")
            .trim_end_matches("```")
            .trim()
    } else if cleaned.starts_with("```") {
        cleaned
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        cleaned
    };

    serde_json::from_str(cleaned).map_err(|err| {
        LexiforgeError::validation(
            format!("{provider} returned non-JSON content: {err}"),
            text.to_string(),
        )
    })
}

/// Maps a non-success HTTP status to the error taxonomy. Billing caps are
/// fatal, rejected credentials are configuration errors, everything else is
/// a transport failure worth retrying.
pub fn classify_http_failure(provider: &str, status: u16, body: &str) -> LexiforgeError {
    let lowered = body.to_ascii_lowercase();
    let quota_exhausted = status == 456
        || lowered.contains("insufficient_quota")
        || lowered.contains("credit balance is too low")
        || lowered.contains("quota_exceeded");

    if quota_exhausted {
        return LexiforgeError::QuotaExhausted {
            provider: provider.to_string(),
            message: format!("HTTP {status}: {}", excerpt(body)),
        };
    }

    match status {
        401 | 403 => LexiforgeError::Configuration(format!(
            "{provider} rejected the configured credentials (HTTP {status})"
        )),
        _ => LexiforgeError::transport(provider, format!("HTTP {status}: {}", excerpt(body))),
    }
}

pub(crate) async fn read_json_body(
    provider: &str,
    response: reqwest::Response,
) -> Result<Value, LexiforgeError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| LexiforgeError::transport(provider, err.to_string()))?;

    if !status.is_success() {
        return Err(classify_http_failure(provider, status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|err| {
        LexiforgeError::transport(provider, format!("unreadable response body: {err}"))
    })
}

pub(crate) fn http_client(
    provider: &str,
    timeout: std::time::Duration,
) -> Result<reqwest::Client, LexiforgeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| {
            LexiforgeError::Configuration(format!("{provider} http client: {err}"))
        })
}

pub(crate) fn validate_base_url(provider: &str, base_url: &str) -> Result<String, LexiforgeError> {
    url::Url::parse(base_url).map_err(|err| {
        LexiforgeError::Configuration(format!("{provider} base url '{base_url}': {err}"))
    })?;
    Ok(base_url.trim_end_matches('/').to_string())
}

fn excerpt(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.chars().count() > LIMIT {
        body.chars().take(LIMIT).collect::<String>() + "..."
    } else {
        body.to_string()
    }
}
