//! Durable record of which items a run has already finished.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use lexiforge_core::LexiforgeError;

/// Finished result for one item, or a bare marker for items that needed no
/// enrichment.
///
/// Results serialize as `{"result": <value>}` and the marker as the string
/// `"processed"`, so no result value can be mistaken for the marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointEntry<T> {
    #[serde(rename = "result")]
    Completed(T),
    Processed,
}

impl<T> CheckpointEntry<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            CheckpointEntry::Completed(value) => Some(value),
            CheckpointEntry::Processed => None,
        }
    }
}

pub type Checkpoint<T> = BTreeMap<String, CheckpointEntry<T>>;

#[async_trait]
pub trait CheckpointStore<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// An absent checkpoint loads as empty.
    async fn load(&self) -> Result<Checkpoint<T>, LexiforgeError>;

    /// Replaces the stored checkpoint with `checkpoint`.
    async fn save(&self, checkpoint: &Checkpoint<T>) -> Result<(), LexiforgeError>;

    async fn clear(&self) -> Result<(), LexiforgeError>;

    /// Moves an existing checkpoint that could not be loaded out of the way
    /// so the next `save` cannot destroy it. Returns where it now lives.
    async fn quarantine(&self) -> Result<Option<PathBuf>, LexiforgeError> {
        Ok(None)
    }
}

/// Single JSON document mapping item id to entry.
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn persistence(path: &Path, err: impl std::fmt::Display) -> LexiforgeError {
    LexiforgeError::Persistence(format!("checkpoint {}: {err}", path.display()))
}

#[async_trait]
impl<T> CheckpointStore<T> for FileCheckpointStore
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Checkpoint<T>, LexiforgeError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(persistence(&self.path, err)),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|err| persistence(&self.path, err))
    }

    async fn save(&self, checkpoint: &Checkpoint<T>) -> Result<(), LexiforgeError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| persistence(&self.path, err))?;
        }
        let body =
            serde_json::to_vec_pretty(checkpoint).map_err(|err| persistence(&self.path, err))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body).map_err(|err| persistence(&tmp, err))?;
        fs::rename(&tmp, &self.path).map_err(|err| persistence(&self.path, err))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), LexiforgeError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(persistence(&self.path, err)),
        }
    }

    async fn quarantine(&self) -> Result<Option<PathBuf>, LexiforgeError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint".to_string());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let target = self.path.with_file_name(format!("{name}.corrupt-{stamp}"));
        fs::rename(&self.path, &target).map_err(|err| persistence(&self.path, err))?;
        Ok(Some(target))
    }
}

#[derive(Debug)]
pub struct InMemoryCheckpointStore<T> {
    inner: Mutex<Checkpoint<T>>,
    saves: AtomicUsize,
}

impl<T> Default for InMemoryCheckpointStore<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
            saves: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone> InMemoryCheckpointStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing checkpoint, as if a previous run had saved it.
    pub fn with_entries(entries: Checkpoint<T>) -> Self {
        Self {
            inner: Mutex::new(entries),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> Checkpoint<T> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> CheckpointStore<T> for InMemoryCheckpointStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Checkpoint<T>, LexiforgeError> {
        Ok(self.snapshot())
    }

    async fn save(&self, checkpoint: &Checkpoint<T>) -> Result<(), LexiforgeError> {
        *self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = checkpoint.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), LexiforgeError> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
