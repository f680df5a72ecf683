use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::tempdir;

use lexiforge_batch::{
    BatchConfig, BatchOrchestrator, CacheQuery, CancellationToken, CheckpointEntry,
    CheckpointStore, EnrichmentItem, EnrichmentTask, FileCheckpointStore, FileReviewSink,
    InMemoryCheckpointStore, InMemoryReviewSink, ItemState, ReviewSink,
};
use lexiforge_cache::{CacheConfig, ResultCache};
use lexiforge_core::{
    GenerationRequest, LexiforgeError, OutputSchema, RetryPolicy, Role, UsageStats,
};
use lexiforge_llm::{GenerationClient, ProviderAdapter, ProviderCall, ProviderReply};

#[derive(Clone, Copy)]
enum Mode {
    Succeed,
    AlwaysTransport,
    EmptyGloss,
    BadCredentials,
    Slow,
}

/// Answers every prompt with a gloss derived from the prompt text.
struct GlossAdapter {
    mode: Mode,
    calls: AtomicU32,
    cancel_after: Option<(u32, CancellationToken)>,
}

impl GlossAdapter {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            calls: AtomicU32::new(0),
            cancel_after: None,
        }
    }

    fn cancelling_after(mut self, calls: u32, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for GlossAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn issue_call(&self, call: ProviderCall<'_>) -> Result<ProviderReply, LexiforgeError> {
        let seen = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if seen >= *limit {
                token.cancel();
            }
        }
        let prompt = call
            .messages
            .iter()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.clone())
            .unwrap_or_default();
        let word = prompt.rsplit(' ').next().unwrap_or_default().to_string();

        let gloss = match self.mode {
            Mode::Succeed => format!("gloss of {word}"),
            Mode::Slow => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                format!("gloss of {word}")
            }
            Mode::EmptyGloss => String::new(),
            Mode::AlwaysTransport => {
                return Err(LexiforgeError::transport("mock", "connection reset"))
            }
            Mode::BadCredentials => {
                return Err(LexiforgeError::Configuration("mock rejected the key".into()))
            }
        };
        Ok(ProviderReply {
            payload: json!({ "gloss": gloss }),
            raw: json!({"usage": {"in": 10, "out": 3}}),
        })
    }

    fn extract_usage(&self, raw: &Value) -> UsageStats {
        UsageStats::new(
            raw["usage"]["in"].as_u64().unwrap_or(0),
            raw["usage"]["out"].as_u64().unwrap_or(0),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Gloss {
    word: String,
    gloss: String,
}

struct GlossTask;

impl GlossTask {
    fn word(item: &EnrichmentItem) -> String {
        item.payload["word"].as_str().unwrap_or_default().to_string()
    }
}

impl EnrichmentTask for GlossTask {
    type Output = Gloss;

    fn component(&self) -> &str {
        "gloss"
    }

    fn missing_fields(&self, item: &EnrichmentItem) -> Vec<String> {
        match item.payload.get("gloss") {
            Some(Value::String(gloss)) if !gloss.is_empty() => Vec::new(),
            _ => vec!["gloss".to_string()],
        }
    }

    fn build_request(
        &self,
        item: &EnrichmentItem,
        _missing: &[String],
        attempt: u32,
    ) -> GenerationRequest {
        let schema = OutputSchema::new(
            "gloss",
            json!({
                "type": "object",
                "required": ["gloss"],
                "properties": {"gloss": {"type": "string"}}
            }),
        );
        GenerationRequest::new(
            format!("Attempt {attempt}: give a short English gloss for {}", Self::word(item)),
            schema,
        )
    }

    fn accept(
        &self,
        item: &EnrichmentItem,
        _missing: &[String],
        payload: &Value,
    ) -> Result<Gloss, String> {
        match payload["gloss"].as_str() {
            Some(gloss) if !gloss.trim().is_empty() => Ok(Gloss {
                word: Self::word(item),
                gloss: gloss.to_string(),
            }),
            _ => Err("gloss is empty".to_string()),
        }
    }

    fn passthrough(&self, item: &EnrichmentItem) -> Option<Gloss> {
        Some(Gloss {
            word: Self::word(item),
            gloss: item.payload["gloss"].as_str()?.to_string(),
        })
    }

    fn cache_query(&self, item: &EnrichmentItem) -> Option<CacheQuery> {
        Some(CacheQuery {
            text: Self::word(item),
            from: "de".to_string(),
            to: "en".to_string(),
            service: "mock".to_string(),
        })
    }

    fn from_cached(&self, item: &EnrichmentItem, cached: &str) -> Option<Gloss> {
        Some(Gloss {
            word: Self::word(item),
            gloss: cached.to_string(),
        })
    }

    fn cache_value(&self, _item: &EnrichmentItem, output: &Gloss) -> Option<String> {
        Some(output.gloss.clone())
    }
}

fn client(adapter: Arc<GlossAdapter>, max_retries: u32) -> Arc<GenerationClient> {
    let policy = RetryPolicy::new(max_retries)
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(2));
    Arc::new(
        GenerationClient::builder()
            .adapter(adapter)
            .model("mock-1")
            .retry_policy(policy)
            .build()
            .expect("client"),
    )
}

fn items(count: usize) -> Vec<EnrichmentItem> {
    (0..count)
        .map(|index| {
            EnrichmentItem::new(
                format!("noun-{index:02}"),
                json!({"word": format!("Wort{index}")}),
            )
        })
        .collect()
}

fn completed(id: &str, word: &str) -> (String, CheckpointEntry<Gloss>) {
    (
        id.to_string(),
        CheckpointEntry::Completed(Gloss {
            word: word.to_string(),
            gloss: "from checkpoint".to_string(),
        }),
    )
}

#[tokio::test]
async fn resume_dispatches_only_pending_items() {
    let adapter = Arc::new(GlossAdapter::new(Mode::Succeed));
    let checkpoint = Arc::new(InMemoryCheckpointStore::with_entries(BTreeMap::from([
        completed("noun-01", "Wort1"),
        completed("noun-04", "Wort4"),
        completed("noun-07", "Wort7"),
    ])));
    let review = Arc::new(InMemoryReviewSink::new());
    let orchestrator = BatchOrchestrator::builder(client(adapter.clone(), 3), GlossTask)
        .config(BatchConfig::default().with_workers(3).with_checkpoint_interval(2))
        .checkpoint_store(checkpoint.clone())
        .review_sink(review.clone())
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(10), true).await.expect("run");

    assert_eq!(adapter.calls(), 7);
    assert_eq!(outcome.successes.len(), 10);
    assert_eq!(outcome.successes["noun-04"].gloss, "from checkpoint");
    assert_eq!(outcome.successes["noun-05"].gloss, "gloss of Wort5");
    assert!(review.is_empty());

    let stats = &outcome.stats;
    assert_eq!(stats.total, 10);
    assert_eq!(stats.resumed, 3);
    assert_eq!(stats.needed, 7);
    assert_eq!(stats.succeeded, 7);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.usage.successful_calls, 7);
    assert_eq!(stats.usage.usage.prompt_tokens, 70);
    assert!((stats.success_rate() - 1.0).abs() < f64::EPSILON);

    assert_eq!(checkpoint.snapshot().len(), 10);
    assert!(checkpoint.save_count() >= 2);
}

#[tokio::test]
async fn fresh_run_ignores_existing_checkpoint() {
    let adapter = Arc::new(GlossAdapter::new(Mode::Succeed));
    let checkpoint = Arc::new(InMemoryCheckpointStore::with_entries(BTreeMap::from([
        completed("noun-00", "Wort0"),
    ])));
    let orchestrator = BatchOrchestrator::builder(client(adapter.clone(), 3), GlossTask)
        .checkpoint_store(checkpoint.clone())
        .review_sink(Arc::new(InMemoryReviewSink::new()))
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(2), false).await.expect("run");

    assert_eq!(adapter.calls(), 2);
    assert_eq!(outcome.stats.resumed, 0);
    assert_eq!(outcome.successes["noun-00"].gloss, "gloss of Wort0");
}

#[tokio::test]
async fn transport_failures_escalate_every_item() {
    let dir = tempdir().expect("tempdir");
    let adapter = Arc::new(GlossAdapter::new(Mode::AlwaysTransport));
    let config = BatchConfig::default()
        .with_max_item_attempts(1)
        .with_workers(2)
        .with_review_dir(dir.path().join("review"))
        .with_checkpoint_path(dir.path().join("checkpoint.json"));
    let orchestrator = BatchOrchestrator::builder(client(adapter.clone(), 3), GlossTask)
        .config(config)
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(5), false).await.expect("run");

    assert_eq!(adapter.calls(), 15);
    assert_eq!(outcome.stats.failed, 5);
    assert_eq!(outcome.stats.succeeded, 0);
    assert!(outcome.successes.is_empty());
    assert_eq!(outcome.state("noun-03"), Some(ItemState::ManualReview));

    let review = FileReviewSink::new(dir.path().join("review"));
    let records = review.list().await;
    assert_eq!(records.len(), 5);
    for record in &records {
        assert_eq!(record.component, "gloss");
        assert_eq!(record.missing_fields, vec!["gloss".to_string()]);
        assert_eq!(record.attempts, 1);
        assert!(record.reason.contains("connection reset"));
    }

    let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));
    let saved = CheckpointStore::<Gloss>::load(&store).await.expect("load");
    assert!(saved.is_empty());
}

#[tokio::test]
async fn rejected_item_is_reviewed_once_and_never_checkpointed() {
    let adapter = Arc::new(GlossAdapter::new(Mode::EmptyGloss));
    let checkpoint = Arc::new(InMemoryCheckpointStore::new());
    let review = Arc::new(InMemoryReviewSink::new());
    let orchestrator = BatchOrchestrator::builder(client(adapter.clone(), 2), GlossTask)
        .config(BatchConfig::default().with_max_item_attempts(3))
        .checkpoint_store(checkpoint.clone())
        .review_sink(review.clone())
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(1), false).await.expect("run");

    assert_eq!(adapter.calls(), 3);
    assert_eq!(review.len(), 1);
    let record = review.get("noun-00").await.expect("record");
    assert!(!record.reason.is_empty());
    assert!(record.reason.contains("gloss is empty"));
    assert_eq!(record.attempts, 3);
    assert!(!checkpoint.snapshot().contains_key("noun-00"));
    assert_eq!(outcome.failures.len(), 1);
}

#[tokio::test]
async fn many_workers_keep_one_checkpoint_entry_per_item() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("state").join("checkpoint.json");
    let adapter = Arc::new(GlossAdapter::new(Mode::Slow));
    let config = BatchConfig::default()
        .with_workers(32)
        .with_checkpoint_interval(1)
        .with_checkpoint_path(&path)
        .with_review_dir(dir.path().join("review"));
    let orchestrator = BatchOrchestrator::builder(client(adapter, 1), GlossTask)
        .config(config)
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(40), false).await.expect("run");

    assert_eq!(outcome.stats.succeeded, 40);
    let raw = std::fs::read_to_string(&path).expect("checkpoint file");
    let saved: BTreeMap<String, CheckpointEntry<Gloss>> =
        serde_json::from_str(&raw).expect("checkpoint json");
    assert_eq!(saved.len(), 40);
    for index in 0..40 {
        let entry = saved[&format!("noun-{index:02}")].completed().expect("result");
        assert_eq!(entry.word, format!("Wort{index}"));
    }
}

#[tokio::test]
async fn cache_hits_skip_generation_and_results_are_cached() {
    let dir = tempdir().expect("tempdir");
    let cache = Arc::new(ResultCache::new(CacheConfig::new(dir.path())).expect("cache"));
    cache.set("Wort0", "cached gloss", "de", "en", "mock");
    let adapter = Arc::new(GlossAdapter::new(Mode::Succeed));
    let orchestrator = BatchOrchestrator::builder(client(adapter.clone(), 1), GlossTask)
        .cache(cache.clone())
        .checkpoint_store(Arc::new(InMemoryCheckpointStore::new()))
        .review_sink(Arc::new(InMemoryReviewSink::new()))
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(3), false).await.expect("run");

    assert_eq!(adapter.calls(), 2);
    assert_eq!(outcome.stats.skipped_via_cache, 1);
    assert_eq!(outcome.stats.succeeded, 3);
    assert_eq!(outcome.successes["noun-00"].gloss, "cached gloss");
    assert_eq!(
        cache.get("Wort2", "de", "en", "mock").as_deref(),
        Some("gloss of Wort2")
    );
}

#[tokio::test]
async fn complete_items_pass_through_without_calls() {
    let adapter = Arc::new(GlossAdapter::new(Mode::Succeed));
    let orchestrator = BatchOrchestrator::builder(client(adapter.clone(), 1), GlossTask)
        .checkpoint_store(Arc::new(InMemoryCheckpointStore::new()))
        .review_sink(Arc::new(InMemoryReviewSink::new()))
        .build()
        .expect("orchestrator");
    let items = vec![
        EnrichmentItem::new("done", json!({"word": "Tisch", "gloss": "table"})),
        EnrichmentItem::new("todo", json!({"word": "Stuhl"})),
    ];

    let outcome = orchestrator.run(items, false).await.expect("run");

    assert_eq!(adapter.calls(), 1);
    assert_eq!(outcome.stats.already_complete, 1);
    assert_eq!(outcome.successes["done"].gloss, "table");
}

#[tokio::test]
async fn cancellation_stops_dispatch_and_flushes() {
    let token = CancellationToken::new();
    let adapter = Arc::new(GlossAdapter::new(Mode::Succeed).cancelling_after(3, token.clone()));
    let checkpoint = Arc::new(InMemoryCheckpointStore::new());
    let orchestrator = BatchOrchestrator::builder(client(adapter.clone(), 1), GlossTask)
        .config(BatchConfig::default().with_workers(1).with_checkpoint_interval(100))
        .checkpoint_store(checkpoint.clone())
        .review_sink(Arc::new(InMemoryReviewSink::new()))
        .cancellation_token(token)
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(10), false).await.expect("run");

    assert_eq!(adapter.calls(), 3);
    assert_eq!(outcome.successes.len(), 3);
    assert_eq!(outcome.stats.not_dispatched, 7);
    assert_eq!(outcome.state("noun-09"), Some(ItemState::Pending));
    assert_eq!(checkpoint.snapshot().len(), 3);
    assert_eq!(checkpoint.save_count(), 1);
}

#[tokio::test]
async fn cancellation_between_item_attempts_leaves_item_pending() {
    let token = CancellationToken::new();
    let adapter = Arc::new(GlossAdapter::new(Mode::EmptyGloss).cancelling_after(1, token.clone()));
    let review = Arc::new(InMemoryReviewSink::new());
    let checkpoint = Arc::new(InMemoryCheckpointStore::new());
    let orchestrator = BatchOrchestrator::builder(client(adapter.clone(), 1), GlossTask)
        .config(BatchConfig::default().with_workers(1).with_max_item_attempts(5))
        .checkpoint_store(checkpoint.clone())
        .review_sink(review.clone())
        .cancellation_token(token)
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(1), false).await.expect("run");

    assert_eq!(adapter.calls(), 1);
    assert!(review.is_empty());
    assert_eq!(outcome.state("noun-00"), Some(ItemState::Pending));
    assert_eq!(outcome.stats.not_dispatched, 1);
    assert_eq!(outcome.stats.failed, 0);
    assert!(outcome.failures.is_empty());
    assert!(checkpoint.snapshot().is_empty());
}

#[tokio::test]
async fn configuration_errors_abort_the_run() {
    let adapter = Arc::new(GlossAdapter::new(Mode::BadCredentials));
    let review = Arc::new(InMemoryReviewSink::new());
    let orchestrator = BatchOrchestrator::builder(client(adapter, 3), GlossTask)
        .config(BatchConfig::default().with_workers(1))
        .checkpoint_store(Arc::new(InMemoryCheckpointStore::new()))
        .review_sink(review.clone())
        .build()
        .expect("orchestrator");

    let err = orchestrator.run(items(4), false).await.unwrap_err();

    assert!(err.is_configuration());
    assert!(review.is_empty());
}

struct FlakyStore {
    inner: InMemoryCheckpointStore<Gloss>,
    failures_left: AtomicU32,
}

#[async_trait]
impl CheckpointStore<Gloss> for FlakyStore {
    async fn load(&self) -> Result<BTreeMap<String, CheckpointEntry<Gloss>>, LexiforgeError> {
        self.inner.load().await
    }

    async fn save(
        &self,
        checkpoint: &BTreeMap<String, CheckpointEntry<Gloss>>,
    ) -> Result<(), LexiforgeError> {
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(LexiforgeError::Persistence("disk full".into()));
        }
        self.inner.save(checkpoint).await
    }

    async fn clear(&self) -> Result<(), LexiforgeError> {
        self.inner.clear().await
    }
}

#[tokio::test]
async fn failed_checkpoint_flush_is_retried_later() {
    let adapter = Arc::new(GlossAdapter::new(Mode::Succeed));
    let store = Arc::new(FlakyStore {
        inner: InMemoryCheckpointStore::new(),
        failures_left: AtomicU32::new(1),
    });
    let orchestrator = BatchOrchestrator::builder(client(adapter, 1), GlossTask)
        .config(BatchConfig::default().with_workers(1).with_checkpoint_interval(2))
        .checkpoint_store(store.clone())
        .review_sink(Arc::new(InMemoryReviewSink::new()))
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(5), false).await.expect("run");

    assert_eq!(outcome.stats.succeeded, 5);
    assert_eq!(store.inner.snapshot().len(), 5);
}

#[test]
fn invalid_config_is_rejected_at_build() {
    let adapter = Arc::new(GlossAdapter::new(Mode::Succeed));
    let result = BatchOrchestrator::builder(client(adapter, 1), GlossTask)
        .config(BatchConfig::default().with_checkpoint_interval(0))
        .build();

    assert!(matches!(result, Err(LexiforgeError::Configuration(_))));
}

/// Echoes the provider payload's `gloss` field as a raw JSON value.
struct RawValueTask;

impl EnrichmentTask for RawValueTask {
    type Output = Value;

    fn component(&self) -> &str {
        "raw"
    }

    fn missing_fields(&self, _item: &EnrichmentItem) -> Vec<String> {
        vec!["gloss".to_string()]
    }

    fn build_request(
        &self,
        item: &EnrichmentItem,
        missing: &[String],
        attempt: u32,
    ) -> GenerationRequest {
        GlossTask.build_request(item, missing, attempt)
    }

    fn accept(
        &self,
        _item: &EnrichmentItem,
        _missing: &[String],
        payload: &Value,
    ) -> Result<Value, String> {
        Ok(payload["gloss"].clone())
    }
}

#[tokio::test]
async fn boolean_results_survive_a_file_checkpoint_resume() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("checkpoint.json");
    let store = FileCheckpointStore::new(&path);
    let seeded = BTreeMap::from([
        ("noun-00".to_string(), CheckpointEntry::Completed(json!(true))),
        ("noun-01".to_string(), CheckpointEntry::Completed(json!(false))),
        ("noun-02".to_string(), CheckpointEntry::Completed(json!("ok"))),
    ]);
    CheckpointStore::<Value>::save(&store, &seeded).await.expect("seed");

    let adapter = Arc::new(GlossAdapter::new(Mode::Succeed));
    let orchestrator = BatchOrchestrator::builder(client(adapter.clone(), 1), RawValueTask)
        .checkpoint_store(Arc::new(FileCheckpointStore::new(&path)))
        .review_sink(Arc::new(InMemoryReviewSink::new()))
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(3), true).await.expect("run");

    assert_eq!(adapter.calls(), 0);
    assert_eq!(outcome.stats.resumed, 3);
    assert_eq!(outcome.successes["noun-00"], json!(true));
    assert_eq!(outcome.successes["noun-01"], json!(false));
    assert_eq!(outcome.successes["noun-02"], json!("ok"));
    assert!(outcome.processed.is_empty());

    let reloaded = CheckpointStore::<Value>::load(&store).await.expect("reload");
    assert_eq!(reloaded, seeded);
}

#[tokio::test]
async fn unreadable_checkpoint_is_moved_aside_before_resume_overwrites_it() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("checkpoint.json");
    let original = b"{\"noun-00\": {\"result\": {\"word\": \"Wort0\", \"gl";
    std::fs::write(&path, original).expect("write");

    let adapter = Arc::new(GlossAdapter::new(Mode::Succeed));
    let orchestrator = BatchOrchestrator::builder(client(adapter.clone(), 1), GlossTask)
        .checkpoint_store(Arc::new(FileCheckpointStore::new(&path)))
        .review_sink(Arc::new(InMemoryReviewSink::new()))
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(2), true).await.expect("run");

    assert_eq!(adapter.calls(), 2);
    assert_eq!(outcome.stats.succeeded, 2);

    let set_aside: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|entry| {
            entry
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("checkpoint.json.corrupt-"))
        })
        .collect();
    assert_eq!(set_aside.len(), 1);
    assert_eq!(std::fs::read(&set_aside[0]).expect("kept bytes"), original.to_vec());

    let store = FileCheckpointStore::new(&path);
    let fresh = CheckpointStore::<Gloss>::load(&store).await.expect("new checkpoint");
    assert_eq!(fresh.len(), 2);
}

/// Fails every load and cannot set the stored checkpoint aside.
#[derive(Default)]
struct UnreadableStore {
    saves: AtomicU32,
}

#[async_trait]
impl CheckpointStore<Gloss> for UnreadableStore {
    async fn load(&self) -> Result<BTreeMap<String, CheckpointEntry<Gloss>>, LexiforgeError> {
        Err(LexiforgeError::Persistence("permission denied".into()))
    }

    async fn save(
        &self,
        _checkpoint: &BTreeMap<String, CheckpointEntry<Gloss>>,
    ) -> Result<(), LexiforgeError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), LexiforgeError> {
        Ok(())
    }
}

#[tokio::test]
async fn unreadable_checkpoint_that_cannot_be_moved_is_never_overwritten() {
    let adapter = Arc::new(GlossAdapter::new(Mode::Succeed));
    let store = Arc::new(UnreadableStore::default());
    let orchestrator = BatchOrchestrator::builder(client(adapter, 1), GlossTask)
        .config(BatchConfig::default().with_checkpoint_interval(1))
        .checkpoint_store(store.clone())
        .review_sink(Arc::new(InMemoryReviewSink::new()))
        .build()
        .expect("orchestrator");

    let outcome = orchestrator.run(items(3), true).await.expect("run");

    assert_eq!(outcome.stats.succeeded, 3);
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
}
