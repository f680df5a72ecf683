use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lexiforge_core::{fingerprint, Clock, LexiforgeError, SystemClock};

use crate::store::{CacheRow, PairStore};
use crate::CacheConfig;

/// Counters since the cache was opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub writes: u64,
    pub write_failures: u64,
    pub loaded_pairs: usize,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// A pair's rows, loaded on first use under the pair's own lock.
type PairSlot = Arc<Mutex<Option<PairStore>>>;

/// Translation cache keyed by `(service, from, to, text)`.
///
/// Each language pair is loaded lazily from `cache_<from>_<to>.json` and kept
/// behind its own lock; writers rewrite the whole pair file while holding it.
/// The table of pairs is only locked long enough to find or create a slot.
/// Storage failures never reach the caller: reads degrade to misses and writes
/// stay in memory until a later write or [`flush`](Self::flush) succeeds.
pub struct ResultCache {
    dir: PathBuf,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    pairs: Mutex<HashMap<String, PairSlot>>,
    counters: Counters,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Result<Self, LexiforgeError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, LexiforgeError> {
        config.validate()?;
        let ttl = chrono::Duration::from_std(config.ttl).map_err(|err| {
            LexiforgeError::Configuration(format!("cache ttl out of range: {err}"))
        })?;
        Ok(Self {
            dir: config.dir,
            ttl,
            clock,
            pairs: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        })
    }

    pub fn key(text: &str, from: &str, to: &str, service: &str) -> String {
        fingerprint([service, from, to, text])
    }

    /// Runs `f` on the pair's rows, loading them first if this is the pair's
    /// first use. Only the pair's own lock is held while its file is read.
    fn with_pair<R>(&self, from: &str, to: &str, f: impl FnOnce(&mut PairStore) -> R) -> R {
        let name = PairStore::file_name(from, to);
        let slot = Arc::clone(lock(&self.pairs).entry(name.clone()).or_default());

        let mut slot = lock(&slot);
        let store = slot.get_or_insert_with(|| {
            let (store, dropped) = PairStore::load(&self.dir, from, to, self.clock.now());
            Counters::bump(&self.counters.expired, dropped as u64);
            tracing::debug!(
                pair = %name,
                entries = store.rows.len(),
                expired = dropped,
                "cache pair loaded"
            );
            store
        });
        f(store)
    }

    fn slots(&self) -> Vec<PairSlot> {
        lock(&self.pairs).values().cloned().collect()
    }

    /// Looks up one row, evicting it if it has expired.
    fn lookup(&self, store: &mut PairStore, key: &str) -> Option<String> {
        let now = self.clock.now();
        match store.rows.get(key) {
            Some(row) if !row.is_expired(now) => {
                Counters::bump(&self.counters.hits, 1);
                Some(row.translation.clone())
            }
            Some(_) => {
                store.rows.remove(key);
                store.dirty = true;
                Counters::bump(&self.counters.expired, 1);
                Counters::bump(&self.counters.misses, 1);
                None
            }
            None => {
                Counters::bump(&self.counters.misses, 1);
                None
            }
        }
    }

    pub fn get(&self, text: &str, from: &str, to: &str, service: &str) -> Option<String> {
        let key = Self::key(text, from, to, service);
        self.with_pair(from, to, |store| self.lookup(store, &key))
    }

    /// Results aligned with `texts`, plus the indices that missed.
    pub fn get_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        from: &str,
        to: &str,
        service: &str,
    ) -> (Vec<Option<String>>, Vec<usize>) {
        self.with_pair(from, to, |store| {
            let mut results = Vec::with_capacity(texts.len());
            let mut missing = Vec::new();
            for (index, text) in texts.iter().enumerate() {
                let found = self.lookup(store, &Self::key(text.as_ref(), from, to, service));
                if found.is_none() {
                    missing.push(index);
                }
                results.push(found);
            }
            (results, missing)
        })
    }

    pub fn set(&self, text: &str, translation: &str, from: &str, to: &str, service: &str) {
        self.set_batch(&[(text, translation)], from, to, service);
    }

    /// Inserts `(text, translation)` pairs and rewrites the pair file.
    pub fn set_batch<S: AsRef<str>, U: AsRef<str>>(
        &self,
        entries: &[(S, U)],
        from: &str,
        to: &str,
        service: &str,
    ) {
        if entries.is_empty() {
            return;
        }
        self.with_pair(from, to, |store| {
            let now = self.clock.now();
            let expires_at = now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            for (text, translation) in entries {
                let text = text.as_ref();
                store.rows.insert(
                    Self::key(text, from, to, service),
                    CacheRow {
                        text: text.to_string(),
                        translation: translation.as_ref().to_string(),
                        service: service.to_string(),
                        created_at: now,
                        expires_at,
                    },
                );
            }
            store.dirty = true;
            Counters::bump(&self.counters.writes, entries.len() as u64);
            self.persist(store);
        });
    }

    fn persist(&self, store: &mut PairStore) -> bool {
        match store.persist() {
            Ok(()) => true,
            Err(err) => {
                Counters::bump(&self.counters.write_failures, 1);
                tracing::warn!(
                    path = %store.path.display(),
                    error = %err,
                    "cache write failed; keeping entries in memory"
                );
                false
            }
        }
    }

    /// Removes expired rows from every loaded pair and rewrites the pairs
    /// that changed. Returns the number of rows removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();

        let mut removed = 0;
        for slot in self.slots() {
            let mut slot = lock(&slot);
            let Some(store) = slot.as_mut() else {
                continue;
            };
            let before = store.rows.len();
            store.rows.retain(|_, row| !row.is_expired(now));
            let purged = before - store.rows.len();
            if purged > 0 {
                store.dirty = true;
                removed += purged;
                self.persist(store);
            }
        }
        Counters::bump(&self.counters.expired, removed as u64);
        removed
    }

    /// Re-persists every pair whose last write did not reach disk.
    pub fn flush(&self) -> Result<(), LexiforgeError> {
        let mut failed = Vec::new();
        for slot in self.slots() {
            let mut slot = lock(&slot);
            if let Some(store) = slot.as_mut() {
                if store.dirty && !self.persist(store) {
                    failed.push(store.path.display().to_string());
                }
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(LexiforgeError::Persistence(format!(
                "could not write cache files: {}",
                failed.join(", ")
            )))
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut loaded_pairs = 0;
        let mut entries = 0;
        for slot in self.slots() {
            if let Some(store) = lock(&slot).as_ref() {
                loaded_pairs += 1;
                entries += store.rows.len();
            }
        }
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
            loaded_pairs,
            entries,
        }
    }
}
