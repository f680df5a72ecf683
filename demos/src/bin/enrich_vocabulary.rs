//! Fills in missing gender, plural, and gloss for German nouns.
//!
//! ```text
//! OPENAI_API_KEY=... cargo run -p lexiforge-demos --bin enrich_vocabulary -- demos/data/vocabulary.json
//! ```
//!
//! Set `LEXIFORGE_RESUME=1` to continue from the last checkpoint.

use std::sync::Arc;

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use lexiforge::prelude::*;

const FIELDS: [&str; 3] = ["gender", "plural", "gloss"];

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
struct NounEntry {
    word: String,
    gender: String,
    plural: String,
    gloss: String,
}

struct NounTask {
    model: String,
}

impl NounTask {
    fn word(item: &EnrichmentItem) -> &str {
        item.payload["word"].as_str().unwrap_or_default()
    }

    fn field<'a>(item: &'a EnrichmentItem, payload: &'a Value, name: &str) -> Option<&'a str> {
        payload[name]
            .as_str()
            .or_else(|| item.payload[name].as_str())
            .filter(|value| !value.trim().is_empty())
    }
}

impl EnrichmentTask for NounTask {
    type Output = NounEntry;

    fn component(&self) -> &str {
        "noun-enricher"
    }

    fn missing_fields(&self, item: &EnrichmentItem) -> Vec<String> {
        FIELDS
            .iter()
            .filter(|field| {
                item.payload[**field]
                    .as_str()
                    .map_or(true, |value| value.trim().is_empty())
            })
            .map(|field| field.to_string())
            .collect()
    }

    fn build_request(
        &self,
        item: &EnrichmentItem,
        missing: &[String],
        attempt: u32,
    ) -> GenerationRequest {
        let mut prompt = format!(
            "German noun: {}\nProvide: {}.",
            Self::word(item),
            missing.join(", ")
        );
        if attempt > 1 {
            prompt.push_str(
                "\nA previous answer was rejected. Use der/die/das genders spelled out as \
                 masculine, feminine, or neuter, and keep the gloss under five words.",
            );
        }
        GenerationRequest::new(prompt, OutputSchema::for_type::<NounEntry>("noun_entry"))
            .with_system_prompt("You are a precise German lexicographer. Answer in JSON.")
            .with_temperature(0.2)
    }

    fn accept(
        &self,
        item: &EnrichmentItem,
        _missing: &[String],
        payload: &Value,
    ) -> Result<NounEntry, String> {
        let gender = Self::field(item, payload, "gender").ok_or("gender is empty")?;
        if !matches!(gender, "masculine" | "feminine" | "neuter") {
            return Err(format!("unexpected gender '{gender}'"));
        }
        Ok(NounEntry {
            word: Self::word(item).to_string(),
            gender: gender.to_string(),
            plural: Self::field(item, payload, "plural")
                .ok_or("plural is empty")?
                .to_string(),
            gloss: Self::field(item, payload, "gloss")
                .ok_or("gloss is empty")?
                .to_string(),
        })
    }

    fn passthrough(&self, item: &EnrichmentItem) -> Option<NounEntry> {
        serde_json::from_value(item.payload.clone()).ok()
    }

    fn cache_query(&self, item: &EnrichmentItem) -> Option<CacheQuery> {
        Some(CacheQuery {
            text: Self::word(item).to_string(),
            from: "de".to_string(),
            to: "en".to_string(),
            service: self.model.clone(),
        })
    }

    fn from_cached(&self, _item: &EnrichmentItem, cached: &str) -> Option<NounEntry> {
        serde_json::from_str(cached).ok()
    }

    fn cache_value(&self, _item: &EnrichmentItem, output: &NounEntry) -> Option<String> {
        serde_json::to_string(output).ok()
    }
}

fn load_items(path: &str) -> anyhow::Result<Vec<EnrichmentItem>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let rows: Vec<Value> = serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
    rows.into_iter()
        .map(|row| {
            let id = row["id"]
                .as_str()
                .context("every vocabulary row needs a string `id`")?
                .to_string();
            Ok(EnrichmentItem::new(id, row))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let input = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/data/vocabulary.json".to_string());
    let model = std::env::var("LEXIFORGE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let resume = std::env::var("LEXIFORGE_RESUME").is_ok_and(|value| value == "1");

    let items = load_items(&input)?;
    let client = Arc::new(
        GenerationClient::builder()
            .registry(ProviderRegistry::from_env()?)
            .model(&model)
            .retry_policy(RetryPolicy::default().with_jitter(true))
            .build()?,
    );
    let cache = Arc::new(ResultCache::new(CacheConfig::from_env()?)?);
    let orchestrator = BatchOrchestrator::builder(
        Arc::clone(&client),
        NounTask {
            model: model.clone(),
        },
    )
    .config(BatchConfig::from_env()?)
    .cache(cache)
    .build()?;

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing in-flight items");
            token.cancel();
        }
    });

    let outcome = orchestrator.run(items, resume).await?;
    let stats = &outcome.stats;
    let cost = ModelPricing::for_model(&model)
        .map(|pricing| stats.usage.usage.estimated_cost(&pricing));

    println!("{}", serde_json::to_string_pretty(&outcome.successes)?);
    println!(
        "succeeded {}/{} (resumed {}, cached {}, manual review {}) in {:.1}s, success rate {:.0}%",
        stats.succeeded,
        stats.needed,
        stats.resumed,
        stats.skipped_via_cache,
        stats.failed,
        stats.elapsed.as_secs_f64(),
        stats.success_rate() * 100.0,
    );
    match cost {
        Some(cost) => println!(
            "tokens: {} prompt / {} completion, estimated ${cost:.4}",
            stats.usage.usage.prompt_tokens, stats.usage.usage.completion_tokens
        ),
        None => println!(
            "tokens: {} prompt / {} completion (no price table entry for {model})",
            stats.usage.usage.prompt_tokens, stats.usage.usage.completion_tokens
        ),
    }
    Ok(())
}
