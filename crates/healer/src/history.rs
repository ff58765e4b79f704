//! Bounded, file-backed history of scheduler cycles.
//!
//! The store is a single JSON array of [`HistoryEntry`] values in
//! chronological order. It is loaded wholesale at startup and rewritten
//! wholesale on every flush through a temp file and rename, so a reader never
//! observes a half-written file.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::types::HistoryEntry;

#[derive(Debug)]
pub struct HistoryStore {
    /// `None` when persistence is disabled.
    path: Option<PathBuf>,
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryStore {
    /// Store that never touches disk.
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            path: None,
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Open the store at `path`, making sure the location is writable.
    ///
    /// An unusable location is an error. Unreadable or corrupt contents are
    /// not: they are logged and the store starts empty.
    pub async fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, PersistenceError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistenceError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| PersistenceError::Io {
                path: path.clone(),
                source,
            })?;

        let mut store = Self {
            path: Some(path),
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        };
        store.load().await;
        Ok(store)
    }

    /// Replace the in-memory entries with the persisted ones.
    ///
    /// Never fails: a missing, unreadable or corrupt file yields an empty store.
    pub async fn load(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };
        self.entries.clear();
        match read_entries(&path).await {
            Ok(entries) => {
                let skip = entries.len().saturating_sub(self.capacity);
                self.entries.extend(entries.into_iter().skip(skip));
                debug!(path = %path.display(), entries = self.entries.len(), "Loaded history");
            }
            Err(e) => warn!(error = %e, "Starting with empty history"),
        }
    }

    /// Append one entry, evicting the oldest once at capacity.
    pub fn append(&mut self, entry: HistoryEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Up to `n` most recent entries, newest last.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    /// Rewrite the persisted file with the current entries.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body = serde_json::to_vec_pretty(&self.entries)?;
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|source| PersistenceError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|source| PersistenceError::Io {
                path: path.clone(),
                source,
            })
    }
}

async fn read_entries(path: &Path) -> Result<Vec<HistoryEntry>, PersistenceError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).map_err(|source| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn entry(minute: i64) -> HistoryEntry {
        HistoryEntry {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + ChronoDuration::minutes(minute),
            reports: vec![],
            outcomes: vec![],
        }
    }

    #[test]
    fn test_fifo_eviction() {
        let mut store = HistoryStore::in_memory(3);
        for minute in 0..5 {
            store.append(entry(minute));
        }
        assert_eq!(store.len(), 3);
        let kept: Vec<_> = store.recent(10).into_iter().map(|e| e.timestamp).collect();
        assert_eq!(kept, vec![entry(2).timestamp, entry(3).timestamp, entry(4).timestamp]);
    }

    #[test]
    fn test_recent_is_newest_last() {
        let mut store = HistoryStore::in_memory(10);
        for minute in 0..4 {
            store.append(entry(minute));
        }
        let recent = store.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp, entry(2).timestamp);
        assert_eq!(recent[1].timestamp, entry(3).timestamp);
        assert_eq!(store.latest().map(|e| e.timestamp), Some(entry(3).timestamp));
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("health.json");

        let mut store = HistoryStore::open(&path, 5).await.unwrap();
        assert!(store.is_empty());
        store.append(entry(0));
        store.append(entry(1));
        store.flush().await.unwrap();
        assert!(!tmp_path(&path).exists());

        let reloaded = HistoryStore::open(&path, 5).await.unwrap();
        assert_eq!(reloaded.recent(5), store.recent(5));
    }

    #[tokio::test]
    async fn test_reload_truncates_to_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.json");

        let mut store = HistoryStore::open(&path, 10).await.unwrap();
        for minute in 0..6 {
            store.append(entry(minute));
        }
        store.flush().await.unwrap();

        let smaller = HistoryStore::open(&path, 4).await.unwrap();
        assert_eq!(smaller.len(), 4);
        assert_eq!(smaller.recent(1)[0].timestamp, entry(5).timestamp);
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = HistoryStore::open(&path, 5).await.unwrap();
        assert!(store.is_empty());

        store.append(entry(0));
        store.flush().await.unwrap();
        let reloaded = HistoryStore::open(&path, 5).await.unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unusable_location_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let err = HistoryStore::open(blocker.join("health.json"), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
    }

    #[tokio::test]
    async fn test_in_memory_flush_is_noop() {
        let mut store = HistoryStore::in_memory(2);
        store.append(entry(0));
        store.flush().await.unwrap();
        assert!(!store.is_persistent());
    }
}
