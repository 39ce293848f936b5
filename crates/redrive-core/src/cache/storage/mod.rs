//! Key/value persistence contract and its backends.
//!
//! Values are JSON documents; keys are plain strings whose namespacing is
//! owned by [`CacheManager`](super::CacheManager). Backends enumerate keys in
//! insertion order, which eviction relies on to break timestamp ties.

mod file;
mod memory;
mod sqlite;

pub use file::JsonFileStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use serde_json::Value;

use super::CacheError;

/// Trait for cache storage backends.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Prepare the backend (load files, run migrations). Idempotent.
    async fn initialize(&self) -> Result<(), CacheError>;

    /// Release the backend. Every later call fails with [`CacheError::Disposed`].
    async fn dispose(&self) -> Result<(), CacheError>;

    /// Insert or overwrite `key`. Overwriting keeps the key's enumeration position.
    async fn store(&self, key: &str, value: Value) -> Result<(), CacheError>;

    async fn retrieve(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Remove `key`; absent keys are not an error.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    /// All keys, oldest insertion first.
    async fn get_all_keys(&self) -> Result<Vec<String>, CacheError>;

    async fn size(&self) -> Result<usize, CacheError>;

    async fn contains_key(&self, key: &str) -> Result<bool, CacheError>;
}
