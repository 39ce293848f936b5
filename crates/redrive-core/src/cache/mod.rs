//! Offline cache: queued requests awaiting redelivery and cached responses,
//! both kept behind a pluggable [`CacheStorage`] backend.

pub mod entry;
pub mod error;
pub mod manager;
pub mod policy;
pub mod storage;

#[cfg(test)]
mod tests;

pub use entry::{CacheEntry, CacheStatistics, CachedRequest, CachedResponse, StatisticsExport};
pub use error::CacheError;
pub use manager::CacheManager;
pub use policy::{CachePolicy, EvictionPolicy};
pub use storage::{CacheStorage, JsonFileStorage, MemoryStorage, SqliteStorage};

use std::sync::Arc;

use crate::config::StorageBackend;

/// Open the configured backend at its default location.
pub async fn open_storage(backend: StorageBackend) -> anyhow::Result<Arc<dyn CacheStorage>> {
    let storage: Arc<dyn CacheStorage> = match backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::Sqlite => Arc::new(SqliteStorage::open_default().await?),
        StorageBackend::File => Arc::new(JsonFileStorage::new(JsonFileStorage::default_path()?)),
    };
    Ok(storage)
}
