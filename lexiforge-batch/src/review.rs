//! Durable escalation of items no retry layer could finish.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sanitize::file_stem;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManualReviewRecord {
    pub item_id: String,
    pub payload: Value,
    pub missing_fields: Vec<String>,
    pub reason: String,
    pub component: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}

impl ManualReviewRecord {
    pub fn new(
        item_id: impl Into<String>,
        payload: Value,
        missing_fields: Vec<String>,
        reason: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            payload,
            missing_fields,
            reason: reason.into(),
            component: component.into(),
            recorded_at: Utc::now(),
            attempts: 0,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Store for manual review records, one per item id.
///
/// `record` never fails: a store that cannot be written logs and drops the
/// record so that the batch keeps going.
#[async_trait]
pub trait ReviewSink: Send + Sync {
    async fn record(&self, record: ManualReviewRecord);

    async fn list(&self) -> Vec<ManualReviewRecord>;

    async fn get(&self, item_id: &str) -> Option<ManualReviewRecord>;
}

/// One pretty-printed JSON file per item in `dir`.
#[derive(Clone, Debug)]
pub struct FileReviewSink {
    dir: PathBuf,
}

impl FileReviewSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, item_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(item_id)))
    }

    fn write(&self, record: &ManualReviewRecord) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.record_path(&record.item_id);
        let body = serde_json::to_vec_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    fn read(path: &Path) -> Option<ManualReviewRecord> {
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unreadable review record");
                None
            }
        }
    }
}

#[async_trait]
impl ReviewSink for FileReviewSink {
    async fn record(&self, record: ManualReviewRecord) {
        match self.write(&record) {
            Ok(path) => tracing::info!(
                item_id = %record.item_id,
                component = %record.component,
                path = %path.display(),
                "item escalated to manual review"
            ),
            Err(err) => tracing::error!(
                item_id = %record.item_id,
                component = %record.component,
                reason = %record.reason,
                error = %err,
                "failed to write manual review record; dropping it"
            ),
        }
    }

    async fn list(&self) -> Vec<ManualReviewRecord> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut records: Vec<ManualReviewRecord> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| Self::read(&path))
            .collect();
        records.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        records
    }

    async fn get(&self, item_id: &str) -> Option<ManualReviewRecord> {
        Self::read(&self.record_path(item_id))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReviewSink {
    records: Mutex<BTreeMap<String, ManualReviewRecord>>,
}

impl InMemoryReviewSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ManualReviewRecord>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ReviewSink for InMemoryReviewSink {
    async fn record(&self, record: ManualReviewRecord) {
        tracing::info!(
            item_id = %record.item_id,
            component = %record.component,
            "item escalated to manual review"
        );
        self.guard().insert(record.item_id.clone(), record);
    }

    async fn list(&self) -> Vec<ManualReviewRecord> {
        self.guard().values().cloned().collect()
    }

    async fn get(&self, item_id: &str) -> Option<ManualReviewRecord> {
        self.guard().get(item_id).cloned()
    }
}
