//! JSON key/value file storage.
//!
//! The whole map is held in memory and written through on every mutation
//! (temp file + rename). A file that fails to parse is logged and replaced
//! by an empty map on the next write.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::CacheStorage;
use crate::cache::CacheError;

#[derive(Debug, Default)]
struct FileState {
    /// `None` until `initialize()` loads the file.
    entries: Option<IndexMap<String, Value>>,
    disposed: bool,
}

pub struct JsonFileStorage {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(FileState::default()),
        }
    }

    /// Storage at `~/.local/state/redrive/cache.json`.
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("redrive")?;
        Ok(xdg_dirs.get_state_home().join("redrive").join("cache.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<IndexMap<String, Value>, CacheError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IndexMap::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "cache file unreadable, starting empty: {}",
                    e
                );
                Ok(IndexMap::new())
            }
        }
    }

    async fn persist(&self, entries: &IndexMap<String, Value>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Run `f` against the loaded map. When `dirty` is set, `f` runs on a
    /// staged copy that replaces the map only once it is on disk.
    async fn with_entries<R>(
        &self,
        dirty: bool,
        f: impl FnOnce(&mut IndexMap<String, Value>) -> R,
    ) -> Result<R, CacheError> {
        let mut state = self.state.lock().await;
        if state.disposed {
            return Err(CacheError::Disposed);
        }
        let entries = state.entries.as_mut().ok_or(CacheError::NotInitialized)?;
        if !dirty {
            return Ok(f(entries));
        }
        let mut staged = entries.clone();
        let out = f(&mut staged);
        self.persist(&staged).await?;
        *entries = staged;
        Ok(out)
    }
}

#[async_trait]
impl CacheStorage for JsonFileStorage {
    async fn initialize(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        if state.disposed {
            return Err(CacheError::Disposed);
        }
        if state.entries.is_none() {
            state.entries = Some(self.load().await?);
        }
        Ok(())
    }

    async fn dispose(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        state.entries = None;
        state.disposed = true;
        Ok(())
    }

    async fn store(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.with_entries(true, |entries| {
            entries.insert(key.to_string(), value);
        })
        .await
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.with_entries(false, |entries| entries.get(key).cloned())
            .await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.with_entries(true, |entries| {
            entries.shift_remove(key);
        })
        .await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.with_entries(true, |entries| entries.clear()).await
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, CacheError> {
        self.with_entries(false, |entries| entries.keys().cloned().collect())
            .await
    }

    async fn size(&self) -> Result<usize, CacheError> {
        self.with_entries(false, |entries| entries.len()).await
    }

    async fn contains_key(&self, key: &str) -> Result<bool, CacheError> {
        self.with_entries(false, |entries| entries.contains_key(key))
            .await
    }
}
