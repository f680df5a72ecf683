use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use lexiforge_cache::ResultCache;
use lexiforge_core::{LexiforgeError, UsageSnapshot};
use lexiforge_llm::GenerationClient;

use crate::checkpoint::{Checkpoint, CheckpointEntry, CheckpointStore, FileCheckpointStore};
use crate::review::{FileReviewSink, ManualReviewRecord, ReviewSink};
use crate::task::{EnrichmentItem, EnrichmentTask};
use crate::BatchConfig;

/// Lifecycle of a single item within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Processing,
    Completed,
    RetryableFailed,
    ManualReview,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemState::Pending => "pending",
            ItemState::Processing => "processing",
            ItemState::Completed => "completed",
            ItemState::RetryableFailed => "retryable_failed",
            ItemState::ManualReview => "manual_review",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchStats {
    pub total: usize,
    /// Satisfied by the loaded checkpoint.
    pub resumed: usize,
    /// Items that had to be dispatched.
    pub needed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_via_cache: usize,
    pub already_complete: usize,
    /// Left pending when the run was cancelled, queued or between attempts.
    pub not_dispatched: usize,
    pub usage: UsageSnapshot,
    pub elapsed: Duration,
}

impl BatchStats {
    /// Share of dispatched items that succeeded; `1.0` when nothing was needed.
    pub fn success_rate(&self) -> f64 {
        if self.needed == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.needed as f64
        }
    }
}

#[derive(Clone, Debug)]
pub struct BatchOutcome<T> {
    /// Completed results by item id, including ones merged from the checkpoint.
    pub successes: BTreeMap<String, T>,
    /// Items finished without a stored value.
    pub processed: Vec<String>,
    /// Manual review reasons by item id.
    pub failures: BTreeMap<String, String>,
    pub states: BTreeMap<String, ItemState>,
    pub stats: BatchStats,
}

impl<T> BatchOutcome<T> {
    pub fn state(&self, item_id: &str) -> Option<ItemState> {
        self.states.get(item_id).copied()
    }
}

enum WorkerReport<T> {
    Completed {
        id: String,
        output: T,
        via_cache: bool,
    },
    AlreadyComplete {
        id: String,
        output: Option<T>,
    },
    ManualReview {
        id: String,
        reason: String,
    },
    Aborted {
        id: String,
        error: LexiforgeError,
    },
    /// Cancelled between item attempts; the item stays pending.
    Abandoned {
        id: String,
    },
}

/// Drives items through the generation client with a bounded worker pool.
///
/// Workers never touch the checkpoint. They report to the run loop, which
/// owns the accumulator and decides when to flush it.
pub struct BatchOrchestrator<T: EnrichmentTask> {
    client: Arc<GenerationClient>,
    task: Arc<T>,
    cache: Option<Arc<ResultCache>>,
    checkpoint: Arc<dyn CheckpointStore<T::Output>>,
    review: Arc<dyn ReviewSink>,
    config: BatchConfig,
    cancel: CancellationToken,
}

pub struct BatchOrchestratorBuilder<T: EnrichmentTask> {
    client: Arc<GenerationClient>,
    task: T,
    cache: Option<Arc<ResultCache>>,
    checkpoint: Option<Arc<dyn CheckpointStore<T::Output>>>,
    review: Option<Arc<dyn ReviewSink>>,
    config: BatchConfig,
    cancel: Option<CancellationToken>,
}

impl<T: EnrichmentTask> BatchOrchestratorBuilder<T> {
    pub fn config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Defaults to a [`FileCheckpointStore`] at `config.checkpoint_path`.
    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore<T::Output>>) -> Self {
        self.checkpoint = Some(store);
        self
    }

    /// Defaults to a [`FileReviewSink`] in `config.review_dir`.
    pub fn review_sink(mut self, sink: Arc<dyn ReviewSink>) -> Self {
        self.review = Some(sink);
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<BatchOrchestrator<T>, LexiforgeError> {
        self.config.validate()?;
        let checkpoint = self.checkpoint.unwrap_or_else(|| {
            Arc::new(FileCheckpointStore::new(&self.config.checkpoint_path))
        });
        let review = self
            .review
            .unwrap_or_else(|| Arc::new(FileReviewSink::new(&self.config.review_dir)));

        Ok(BatchOrchestrator {
            client: self.client,
            task: Arc::new(self.task),
            cache: self.cache,
            checkpoint,
            review,
            config: self.config,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

struct WorkerContext<T: EnrichmentTask> {
    client: Arc<GenerationClient>,
    task: Arc<T>,
    cache: Option<Arc<ResultCache>>,
    review: Arc<dyn ReviewSink>,
    max_item_attempts: u32,
    queue: Mutex<VecDeque<EnrichmentItem>>,
    cancel: CancellationToken,
}

impl<T: EnrichmentTask> WorkerContext<T> {
    fn next_item(&self) -> Option<EnrichmentItem> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn remaining(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn cached(&self, item: &EnrichmentItem) -> Option<T::Output> {
        let cache = self.cache.as_ref()?;
        let query = self.task.cache_query(item)?;
        let hit = cache.get(&query.text, &query.from, &query.to, &query.service)?;
        self.task.from_cached(item, &hit)
    }

    fn remember(&self, item: &EnrichmentItem, output: &T::Output) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let Some(query) = self.task.cache_query(item) else {
            return;
        };
        if let Some(value) = self.task.cache_value(item, output) {
            cache.set(&query.text, &value, &query.from, &query.to, &query.service);
        }
    }

    async fn process(&self, item: EnrichmentItem) -> WorkerReport<T::Output> {
        tracing::debug!(item_id = %item.id, state = %ItemState::Processing, "item dequeued");

        let missing = self.task.missing_fields(&item);
        if missing.is_empty() {
            return WorkerReport::AlreadyComplete {
                output: self.task.passthrough(&item),
                id: item.id,
            };
        }

        if let Some(output) = self.cached(&item) {
            return WorkerReport::Completed {
                id: item.id,
                output,
                via_cache: true,
            };
        }

        let mut reason = String::new();
        let mut attempts = 0;
        for attempt in 1..=self.max_item_attempts {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    item_id = %item.id,
                    attempt,
                    "run cancelled; leaving item pending"
                );
                return WorkerReport::Abandoned { id: item.id };
            }
            attempts = attempt;
            let request = self.task.build_request(&item, &missing, attempt);
            match self.client.generate(&request).await {
                Ok(response) => match self.task.accept(&item, &missing, &response.payload) {
                    Ok(output) => {
                        self.remember(&item, &output);
                        return WorkerReport::Completed {
                            id: item.id,
                            output,
                            via_cache: false,
                        };
                    }
                    Err(rejection) => {
                        reason = format!("rejected by validation: {rejection}");
                    }
                },
                Err(error) if error.is_configuration() => {
                    return WorkerReport::Aborted { id: item.id, error };
                }
                Err(error) => {
                    reason = error.to_string();
                    if !error.is_retryable() {
                        tracing::warn!(
                            item_id = %item.id,
                            attempt,
                            error = %error,
                            "fatal generation error; skipping remaining item attempts"
                        );
                        break;
                    }
                }
            }
            tracing::debug!(
                item_id = %item.id,
                attempt,
                state = %ItemState::RetryableFailed,
                reason = %reason,
                "item attempt failed"
            );
        }

        let record = ManualReviewRecord::new(
            item.id.clone(),
            item.payload,
            missing,
            reason.clone(),
            self.task.component(),
        )
        .with_attempts(attempts);
        self.review.record(record).await;
        WorkerReport::ManualReview { id: item.id, reason }
    }
}

async fn worker_loop<T: EnrichmentTask>(
    worker: usize,
    ctx: Arc<WorkerContext<T>>,
    reports: mpsc::Sender<WorkerReport<T::Output>>,
) {
    while let Some(item) = ctx.next_item() {
        let report = ctx.process(item).await;
        if reports.send(report).await.is_err() {
            break;
        }
    }
    tracing::trace!(worker, "worker finished");
}

impl<T: EnrichmentTask> BatchOrchestrator<T> {
    pub fn builder(client: Arc<GenerationClient>, task: T) -> BatchOrchestratorBuilder<T> {
        BatchOrchestratorBuilder {
            client,
            task,
            cache: None,
            checkpoint: None,
            review: None,
            config: BatchConfig::default(),
            cancel: None,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Cancelling stops dispatch; in-flight items finish and the checkpoint
    /// is flushed before `run` returns.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn flush(&self, accumulator: &Checkpoint<T::Output>, dirty: &mut bool) {
        match self.checkpoint.save(accumulator).await {
            Ok(()) => {
                *dirty = false;
                tracing::debug!(entries = accumulator.len(), "checkpoint flushed");
            }
            Err(err) => {
                tracing::error!(error = %err, "checkpoint flush failed; retrying at next flush");
            }
        }
    }

    /// Returns whether this run may write the checkpoint. An unreadable
    /// checkpoint is only replaced once the store has moved it aside.
    async fn set_aside_unreadable(&self, load_error: &LexiforgeError) -> bool {
        match self.checkpoint.quarantine().await {
            Ok(Some(moved_to)) => {
                tracing::warn!(
                    error = %load_error,
                    moved_to = %moved_to.display(),
                    "checkpoint unreadable; moved aside and starting from scratch"
                );
                true
            }
            Ok(None) => {
                tracing::error!(
                    error = %load_error,
                    "checkpoint unreadable and cannot be moved aside; this run will not write it"
                );
                false
            }
            Err(err) => {
                tracing::error!(
                    error = %load_error,
                    quarantine_error = %err,
                    "checkpoint unreadable and cannot be moved aside; this run will not write it"
                );
                false
            }
        }
    }

    /// Runs every item not already in the checkpoint (when `resume` is set)
    /// and returns the merged results.
    ///
    /// Item failures never fail the run; they end up in the review sink.
    /// Only configuration problems are returned as errors.
    pub async fn run(
        &self,
        items: Vec<EnrichmentItem>,
        resume: bool,
    ) -> Result<BatchOutcome<T::Output>, LexiforgeError> {
        self.config.validate()?;
        let started = Instant::now();
        let usage_before = self.client.usage();

        let mut writable = true;
        let mut accumulator: Checkpoint<T::Output> = if resume {
            match self.checkpoint.load().await {
                Ok(checkpoint) => checkpoint,
                Err(err) => {
                    writable = self.set_aside_unreadable(&err).await;
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        let mut outcome = BatchOutcome {
            successes: BTreeMap::new(),
            processed: Vec::new(),
            failures: BTreeMap::new(),
            states: BTreeMap::new(),
            stats: BatchStats::default(),
        };

        let mut seen = HashSet::new();
        let mut pending = VecDeque::new();
        for item in items {
            if !seen.insert(item.id.clone()) {
                tracing::warn!(item_id = %item.id, "duplicate item id; keeping the first");
                continue;
            }
            match accumulator.get(&item.id) {
                Some(CheckpointEntry::Completed(value)) => {
                    outcome.successes.insert(item.id.clone(), value.clone());
                    outcome.states.insert(item.id, ItemState::Completed);
                    outcome.stats.resumed += 1;
                }
                Some(CheckpointEntry::Processed) => {
                    outcome.processed.push(item.id.clone());
                    outcome.states.insert(item.id, ItemState::Completed);
                    outcome.stats.resumed += 1;
                }
                None => {
                    outcome.states.insert(item.id.clone(), ItemState::Pending);
                    pending.push_back(item);
                }
            }
        }
        outcome.stats.total = seen.len();
        outcome.stats.needed = pending.len();

        let workers = self.config.effective_workers().min(pending.len());
        tracing::info!(
            total = outcome.stats.total,
            resumed = outcome.stats.resumed,
            needed = outcome.stats.needed,
            workers,
            "batch run starting"
        );

        let run_cancel = self.cancel.child_token();
        let ctx = Arc::new(WorkerContext {
            client: Arc::clone(&self.client),
            task: Arc::clone(&self.task),
            cache: self.cache.clone(),
            review: Arc::clone(&self.review),
            max_item_attempts: self.config.max_item_attempts,
            queue: Mutex::new(pending),
            cancel: run_cancel.clone(),
        });

        let (tx, mut rx) = mpsc::channel(self.config.effective_workers() * 2);
        let mut pool = JoinSet::new();
        for worker in 0..workers {
            pool.spawn(worker_loop(worker, Arc::clone(&ctx), tx.clone()));
        }
        drop(tx);

        let mut dirty = false;
        let mut since_flush = 0usize;
        let mut abort: Option<LexiforgeError> = None;
        while let Some(report) = rx.recv().await {
            match report {
                WorkerReport::Completed {
                    id,
                    output,
                    via_cache,
                } => {
                    if via_cache {
                        outcome.stats.skipped_via_cache += 1;
                    }
                    outcome.stats.succeeded += 1;
                    accumulator.insert(id.clone(), CheckpointEntry::Completed(output.clone()));
                    outcome.successes.insert(id.clone(), output);
                    outcome.states.insert(id, ItemState::Completed);
                }
                WorkerReport::AlreadyComplete { id, output } => {
                    outcome.stats.already_complete += 1;
                    outcome.stats.succeeded += 1;
                    match output {
                        Some(output) => {
                            accumulator
                                .insert(id.clone(), CheckpointEntry::Completed(output.clone()));
                            outcome.successes.insert(id.clone(), output);
                        }
                        None => {
                            accumulator.insert(id.clone(), CheckpointEntry::Processed);
                            outcome.processed.push(id.clone());
                        }
                    }
                    outcome.states.insert(id, ItemState::Completed);
                }
                WorkerReport::ManualReview { id, reason } => {
                    outcome.stats.failed += 1;
                    outcome.failures.insert(id.clone(), reason);
                    outcome.states.insert(id, ItemState::ManualReview);
                    continue;
                }
                WorkerReport::Aborted { id, error } => {
                    tracing::error!(item_id = %id, error = %error, "configuration error; aborting run");
                    outcome.states.insert(id, ItemState::Pending);
                    run_cancel.cancel();
                    abort.get_or_insert(error);
                    continue;
                }
                WorkerReport::Abandoned { id } => {
                    outcome.stats.not_dispatched += 1;
                    outcome.states.insert(id, ItemState::Pending);
                    continue;
                }
            }

            dirty = true;
            since_flush += 1;
            if writable && since_flush >= self.config.checkpoint_interval {
                since_flush = 0;
                self.flush(&accumulator, &mut dirty).await;
            }
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "batch worker panicked");
            }
        }

        if writable {
            self.flush(&accumulator, &mut dirty).await;
        }
        if dirty {
            tracing::error!(
                entries = accumulator.len(),
                "checkpoint not written at end of run; completed work is not durable"
            );
        }
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.flush() {
                tracing::warn!(error = %err, "result cache flush failed");
            }
        }

        outcome.stats.not_dispatched += ctx.remaining();
        outcome.stats.usage = self.client.usage().since(&usage_before);
        outcome.stats.elapsed = started.elapsed();

        if let Some(error) = abort {
            return Err(error);
        }

        if outcome.stats.not_dispatched > 0 {
            tracing::warn!(
                not_dispatched = outcome.stats.not_dispatched,
                "batch run cancelled before all items were dispatched"
            );
        }
        tracing::info!(
            succeeded = outcome.stats.succeeded,
            failed = outcome.stats.failed,
            skipped_via_cache = outcome.stats.skipped_via_cache,
            already_complete = outcome.stats.already_complete,
            prompt_tokens = outcome.stats.usage.usage.prompt_tokens,
            completion_tokens = outcome.stats.usage.usage.completion_tokens,
            elapsed_ms = outcome.stats.elapsed.as_millis() as u64,
            "batch run finished"
        );
        Ok(outcome)
    }
}
