use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted translation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRow {
    pub text: String,
    pub translation: String,
    pub service: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheRow {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// In-memory rows of one language pair plus the file backing them.
#[derive(Debug)]
pub(crate) struct PairStore {
    pub(crate) path: PathBuf,
    pub(crate) rows: HashMap<String, CacheRow>,
    pub(crate) dirty: bool,
}

impl PairStore {
    pub(crate) fn file_name(from: &str, to: &str) -> String {
        format!("cache_{}_{}.json", sanitize(from), sanitize(to))
    }

    /// Reads the pair file, keeping only rows still valid at `now`. A missing
    /// or unreadable file yields an empty pair.
    pub(crate) fn load(dir: &Path, from: &str, to: &str, now: DateTime<Utc>) -> (Self, usize) {
        let path = dir.join(Self::file_name(from, to));
        let mut store = Self {
            path,
            rows: HashMap::new(),
            dirty: false,
        };

        let raw = match fs::read_to_string(&store.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return (store, 0),
            Err(err) => {
                tracing::warn!(
                    path = %store.path.display(),
                    error = %err,
                    "cache file unreadable; starting empty"
                );
                return (store, 0);
            }
        };

        let rows: HashMap<String, CacheRow> = match serde_json::from_str(&raw) {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(
                    path = %store.path.display(),
                    error = %err,
                    "cache file corrupt; starting empty"
                );
                return (store, 0);
            }
        };

        let total = rows.len();
        store.rows = rows
            .into_iter()
            .filter(|(_, row)| !row.is_expired(now))
            .collect();
        let dropped = total - store.rows.len();
        if dropped > 0 {
            store.dirty = true;
        }
        (store, dropped)
    }

    /// Rewrites the whole pair through a temp file and a rename.
    pub(crate) fn persist(&mut self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(&self.rows)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        Ok(())
    }
}

fn sanitize(lang: &str) -> String {
    let cleaned: String = lang
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "auto".to_string()
    } else {
        cleaned
    }
}
