//! Local persisted state: a handful of independently keyed JSON values kept
//! in one file. Without a path the store lives in memory only.

use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{info, warn};

pub const THEME_KEY: &str = "theme";
pub const GENERATION_COUNT_KEY: &str = "generation_count";
pub const NEWSLETTER_KEY: &str = "newsletter_subscribed";
pub const HISTORY_KEY: &str = "history";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")] Io(#[from] std::io::Error),
    #[error("serialization error: {0}")] Serde(#[from] serde_json::Error),
}

type Values = BTreeMap<String, serde_json::Value>;

pub struct LocalStore {
    path: Option<PathBuf>,
    values: RwLock<Snapshot>,
    /// Sequence number of the snapshot last written to disk.
    written: Mutex<u64>,
}

#[derive(Default)]
struct Snapshot {
    seq: u64,
    values: Values,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self { path: None, values: RwLock::default(), written: Mutex::new(0) }
    }

    /// Opens the state file, starting empty when it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let values: Values = serde_json::from_str(&fs::read_to_string(&path)?)?;
            info!("📂 Loaded {} stored values from {}", values.len(), path.display());
            values
        } else {
            info!("📂 No state file at {}, starting fresh", path.display());
            Values::new()
        };
        Ok(Self { path: Some(path), values: RwLock::new(Snapshot { seq: 0, values }), written: Mutex::new(0) })
    }

    /// Reads a value, falling back to the default when absent or unreadable.
    pub fn get<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let guard = self.values.read();
        let Some(value) = guard.values.get(key) else { return T::default() };
        serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            warn!("⚠️ Ignoring unreadable stored value '{}': {}", key, e);
            T::default()
        })
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.update(key, |current: &mut serde_json::Value| {
            *current = serde_json::to_value(value)?;
            Ok::<_, StoreError>(())
        })?
    }

    /// Read-modify-write of one key under the write lock. A stored value that
    /// no longer deserializes as `T` is an error and is left untouched.
    /// Returns once the new state is on disk.
    pub fn update<T, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let (result, seq, bytes) = {
            let mut guard = self.values.write();
            let mut current: T = match guard.values.get(key) {
                Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                    warn!("⚠️ Refusing to overwrite unreadable stored value '{}': {}", key, e);
                    e
                })?,
                None => T::default(),
            };
            let result = f(&mut current);
            guard.values.insert(key.to_string(), serde_json::to_value(&current)?);
            guard.seq += 1;
            let bytes = match self.path {
                Some(_) => serde_json::to_vec_pretty(&guard.values)?,
                None => Vec::new(),
            };
            (result, guard.seq, bytes)
        };
        off_worker(|| self.persist(seq, &bytes))?;
        Ok(result)
    }

    /// Writes snapshot `seq` unless a newer one already reached the disk.
    fn persist(&self, seq: u64, bytes: &[u8]) -> Result<(), StoreError> {
        let Some(path) = &self.path else { return Ok(()) };
        let mut written = self.written.lock();
        if *written >= seq {
            return Ok(());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        *written = seq;
        Ok(())
    }
}

/// Runs blocking file I/O so that a multi-threaded runtime hands this
/// worker's other tasks to another thread first.
fn off_worker<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(f),
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, GenerationParameters, HistoryRecord};
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_keys_read_as_default() {
        let store = LocalStore::in_memory();
        assert_eq!(store.get::<u64>(GENERATION_COUNT_KEY), 0);
        assert_eq!(store.get::<Vec<String>>(HISTORY_KEY), Vec::<String>::new());
    }

    #[test]
    fn update_returns_closure_result() {
        let store = LocalStore::in_memory();
        let n = store.update(GENERATION_COUNT_KEY, |c: &mut u64| { *c += 1; *c }).unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.get::<u64>(GENERATION_COUNT_KEY), 1);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        {
            let store = LocalStore::open(&path).unwrap();
            store.set(NEWSLETTER_KEY, &true).unwrap();
            store.set(THEME_KEY, &"dark").unwrap();
        }
        let reopened = LocalStore::open(&path).unwrap();
        assert!(reopened.get::<bool>(NEWSLETTER_KEY));
        assert_eq!(reopened.get::<String>(THEME_KEY), "dark");
    }

    #[test]
    fn update_refuses_to_overwrite_unreadable_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let stale = serde_json::json!({
            "history": [{
                "id": uuid::Uuid::nil(),
                "params": GenerationParameters::new("Aurora Necklace", ContentType::AdCopy),
                "rawText": "keep me",
                "createdAt": "2026-01-01T00:00:00Z"
            }]
        });
        fs::write(&path, stale.to_string()).unwrap();

        let store = LocalStore::open(&path).unwrap();
        let err = store.update(HISTORY_KEY, |history: &mut Vec<HistoryRecord>| history.clear()).unwrap_err();
        assert!(matches!(err, StoreError::Serde(_)));
        assert!(fs::read_to_string(&path).unwrap().contains("keep me"));
        assert!(store.get::<Vec<HistoryRecord>>(HISTORY_KEY).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_updates_on_a_worker_all_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = std::sync::Arc::new(LocalStore::open(&path).unwrap());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.update(GENERATION_COUNT_KEY, |c: &mut u64| *c += 1).unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(LocalStore::open(&path).unwrap().get::<u64>(GENERATION_COUNT_KEY), 16);
    }

    #[test]
    fn unreadable_value_falls_back_to_default() {
        let store = LocalStore::in_memory();
        store.set(GENERATION_COUNT_KEY, &"not a number").unwrap();
        assert_eq!(store.get::<u64>(GENERATION_COUNT_KEY), 0);
    }
}
