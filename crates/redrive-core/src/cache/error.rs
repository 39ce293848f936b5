//! Offline cache error type.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The manager or backend was disposed; no further calls are accepted.
    #[error("cache storage has been disposed")]
    Disposed,
    /// A file-backed store was used before `initialize()`.
    #[error("cache storage is not initialized")]
    NotInitialized,
    #[error("invalid cache policy: {0}")]
    Config(#[from] ConfigError),
    #[error("sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize cache entry: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}
