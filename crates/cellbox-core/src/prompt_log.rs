//! Append-only bounded history of submitted prompts.
//!
//! There is exactly one log per deployment. All access is serialized through
//! a single `RwLock` owner, which makes append/list/clear linearizable
//! without any client-side coordination. Entries are stored most-recent-last
//! and capped at a configurable bound; the oldest entries are dropped first.
//!
//! Persistence is optional: with a path configured, every mutation rewrites a
//! small JSON file while the write lock is held, so the on-disk state always
//! matches some point in the linear history.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::errors::SandboxError;

pub const DEFAULT_MAX_ENTRIES: usize = 100;

pub struct PromptLog {
    entries: RwLock<VecDeque<String>>,
    path: Option<PathBuf>,
    max_entries: usize,
}

impl PromptLog {
    /// Volatile log with no persistence.
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            path: None,
            max_entries,
        }
    }

    /// Durable log backed by a JSON file, loaded eagerly.
    ///
    /// A missing file starts an empty history. A corrupt file is discarded
    /// with a warning rather than wedging the store: history is display
    /// data, not a record anything depends on.
    pub async fn open(path: impl AsRef<Path>, max_entries: usize) -> Result<Self, SandboxError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::LogUnavailable(e.to_string()))?;
        }

        let entries = match tokio::fs::read(&path).await {
            Ok(data) => match serde_json::from_slice::<Vec<String>>(&data) {
                Ok(stored) => {
                    log::info!("Loaded {} prompt entries from {:?}", stored.len(), path);
                    stored.into()
                }
                Err(e) => {
                    log::warn!("Discarding corrupt prompt history at {:?}: {}", path, e);
                    VecDeque::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VecDeque::new(),
            Err(e) => return Err(SandboxError::LogUnavailable(e.to_string())),
        };

        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path),
            max_entries,
        })
    }

    /// Append one entry, dropping the oldest beyond the retention bound.
    ///
    /// The in-memory history only advances once the new state is persisted,
    /// so a failed write never leaves memory and disk disagreeing.
    pub async fn append(&self, text: impl Into<String>) -> Result<(), SandboxError> {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        next.push_back(text.into());
        while next.len() > self.max_entries {
            next.pop_front();
        }
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    /// Current entries, oldest first. Empty history is an empty vector,
    /// never an error.
    pub async fn list(&self) -> Vec<String> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Remove all entries atomically.
    pub async fn clear(&self) -> Result<(), SandboxError> {
        let mut entries = self.entries.write().await;
        self.persist(&VecDeque::new()).await?;
        entries.clear();
        Ok(())
    }

    // Called with the write lock held so persisted snapshots follow the
    // linear history.
    async fn persist(&self, entries: &VecDeque<String>) -> Result<(), SandboxError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot: Vec<&String> = entries.iter().collect();
        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| SandboxError::LogUnavailable(e.to_string()))?;
        tokio::fs::write(path, data)
            .await
            .map_err(|e| SandboxError::LogUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_then_list_then_clear() {
        let log = PromptLog::in_memory(DEFAULT_MAX_ENTRIES);

        assert!(log.list().await.is_empty());

        log.append("x").await.unwrap();
        assert_eq!(log.list().await, vec!["x".to_string()]);

        log.clear().await.unwrap();
        assert!(log.list().await.is_empty());
    }

    #[tokio::test]
    async fn entries_are_ordered_oldest_first_without_deduplication() {
        let log = PromptLog::in_memory(DEFAULT_MAX_ENTRIES);
        log.append("first").await.unwrap();
        log.append("second").await.unwrap();
        log.append("first").await.unwrap();

        assert_eq!(log.list().await, vec!["first", "second", "first"]);
    }

    #[tokio::test]
    async fn retention_bound_drops_the_oldest_entries() {
        let log = PromptLog::in_memory(3);
        for i in 0..5 {
            log.append(format!("prompt {}", i)).await.unwrap();
        }

        assert_eq!(log.list().await, vec!["prompt 2", "prompt 3", "prompt 4"]);
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prompts.json");

        {
            let log = PromptLog::open(&path, DEFAULT_MAX_ENTRIES).await.unwrap();
            log.append("remembered").await.unwrap();
        }

        let log = PromptLog::open(&path, DEFAULT_MAX_ENTRIES).await.unwrap();
        assert_eq!(log.list().await, vec!["remembered".to_string()]);

        log.clear().await.unwrap();
        drop(log);
        let log = PromptLog::open(&path, DEFAULT_MAX_ENTRIES).await.unwrap();
        assert!(log.list().await.is_empty());
    }

    #[tokio::test]
    async fn failed_persist_does_not_advance_the_history() {
        let dir = tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let path = store_dir.join("prompts.json");
        let log = PromptLog::open(&path, DEFAULT_MAX_ENTRIES).await.unwrap();
        log.append("kept").await.unwrap();

        // Pull the storage directory out from under the log so writes fail.
        tokio::fs::remove_dir_all(&store_dir).await.unwrap();

        assert!(log.append("dropped").await.is_err());
        assert_eq!(log.list().await, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn corrupt_history_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        tokio::fs::write(&path, b"{ not json ]").await.unwrap();

        let log = PromptLog::open(&path, DEFAULT_MAX_ENTRIES).await.unwrap();
        assert!(log.list().await.is_empty());

        // The store stays usable after discarding the corrupt file.
        log.append("fresh").await.unwrap();
        assert_eq!(log.list().await, vec!["fresh".to_string()]);
    }
}
