//! Volatile in-process storage.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Mutex;

use super::CacheStorage;
use crate::cache::CacheError;

#[derive(Debug, Default)]
struct MemoryState {
    entries: IndexMap<String, Value>,
    disposed: bool,
}

/// Storage that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<R>(
        &self,
        f: impl FnOnce(&mut IndexMap<String, Value>) -> R,
    ) -> Result<R, CacheError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| CacheError::Other(format!("memory storage lock poisoned: {e}")))?;
        if state.disposed {
            return Err(CacheError::Disposed);
        }
        Ok(f(&mut state.entries))
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn initialize(&self) -> Result<(), CacheError> {
        self.with_entries(|_| ())
    }

    async fn dispose(&self) -> Result<(), CacheError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| CacheError::Other(format!("memory storage lock poisoned: {e}")))?;
        state.entries.clear();
        state.disposed = true;
        Ok(())
    }

    async fn store(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            entries.shift_remove(key);
        })
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.with_entries(|entries| entries.clear())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, CacheError> {
        self.with_entries(|entries| entries.keys().cloned().collect())
    }

    async fn size(&self) -> Result<usize, CacheError> {
        self.with_entries(|entries| entries.len())
    }

    async fn contains_key(&self, key: &str) -> Result<bool, CacheError> {
        self.with_entries(|entries| entries.contains_key(key))
    }
}
