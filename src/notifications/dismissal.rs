// src/notifications/dismissal.rs

//! Persisted set of violation ids each teacher has hidden.

use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("dismissal store I/O failed: {0}")]
    Io(String),

    #[error("dismissal store is corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Corrupt(err.to_string())
    }
}

#[async_trait]
pub trait DismissalStore: Send + Sync {
    async fn get(&self, teacher_id: i64) -> Result<HashSet<String>, PersistenceError>;

    /// Replaces the teacher's whole dismissal set.
    async fn set(&self, teacher_id: i64, ids: &HashSet<String>) -> Result<(), PersistenceError>;
}

/// One JSON array per teacher under a directory, surviving restarts.
#[derive(Debug, Clone)]
pub struct FileDismissalStore {
    dir: PathBuf,
}

impl FileDismissalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, teacher_id: i64) -> PathBuf {
        self.dir.join(format!("dismissed-{}.json", teacher_id))
    }
}

#[async_trait]
impl DismissalStore for FileDismissalStore {
    async fn get(&self, teacher_id: i64) -> Result<HashSet<String>, PersistenceError> {
        let bytes = match tokio::fs::read(self.path_for(teacher_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e.into()),
        };
        let ids: Vec<String> = serde_json::from_slice(&bytes)?;
        Ok(ids.into_iter().collect())
    }

    async fn set(&self, teacher_id: i64, ids: &HashSet<String>) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        let body = serde_json::to_vec(&sorted)?;

        // Write then rename so a crash never leaves a half-written file.
        let path = self.path_for(teacher_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(teacher_id, count = ids.len(), "Dismissals persisted");
        Ok(())
    }
}

/// Dismissal store kept in memory. `set_failing(true)` makes every call error.
#[derive(Debug, Default)]
pub struct InMemoryDismissalStore {
    sets: Mutex<HashMap<i64, HashSet<String>>>,
    failing: AtomicBool,
}

impl InMemoryDismissalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(PersistenceError::Io("storage unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DismissalStore for InMemoryDismissalStore {
    async fn get(&self, teacher_id: i64) -> Result<HashSet<String>, PersistenceError> {
        self.check()?;
        let sets = self
            .sets
            .lock()
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        Ok(sets.get(&teacher_id).cloned().unwrap_or_default())
    }

    async fn set(&self, teacher_id: i64, ids: &HashSet<String>) -> Result<(), PersistenceError> {
        self.check()?;
        let mut sets = self
            .sets
            .lock()
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        sets.insert(teacher_id, ids.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("dismissals-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_missing_file_means_nothing_dismissed() {
        let store = FileDismissalStore::new(scratch_dir());
        assert!(store.get(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_survives_new_instance() {
        let dir = scratch_dir();
        let ids: HashSet<String> = ["v1", "live-1-5"].iter().map(|s| s.to_string()).collect();

        FileDismissalStore::new(&dir).set(1, &ids).await.unwrap();

        let reopened = FileDismissalStore::new(&dir);
        assert_eq!(reopened.get(1).await.unwrap(), ids);
        assert!(reopened.get(2).await.unwrap().is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("dismissed-3.json"), b"{not json").unwrap();

        let store = FileDismissalStore::new(&dir);
        assert!(matches!(store.get(3).await, Err(PersistenceError::Corrupt(_))));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_in_memory_store_failure_toggle() {
        let store = InMemoryDismissalStore::new();
        store.set(1, &HashSet::from(["a".to_string()])).await.unwrap();
        store.set_failing(true);
        assert!(store.get(1).await.is_err());
        store.set_failing(false);
        assert_eq!(store.get(1).await.unwrap().len(), 1);
    }
}
