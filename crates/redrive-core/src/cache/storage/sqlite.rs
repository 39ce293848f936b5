//! SQLite-backed storage (sqlx).
//!
//! One table of key/JSON rows. The `seq` column preserves insertion order
//! for key enumeration; upserts keep the original `seq`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::CacheStorage;
use crate::cache::entry::unix_millis;
use crate::cache::CacheError;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the SQLite cache database.
///
/// The default file is stored under the XDG state directory:
/// `~/.local/state/redrive/cache.db`.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
    disposed: AtomicBool,
}

impl SqliteStorage {
    /// Open (or create) the default cache database and run migrations.
    pub async fn open_default() -> anyhow::Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("redrive")?;
        let db_path = xdg_dirs.get_state_home().join("redrive").join("cache.db");
        Ok(Self::open_at(&db_path).await?)
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let storage = Self::from_pool(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    /// Open a private in-memory database (nothing touches disk).
    pub async fn open_memory() -> Result<Self, CacheError> {
        // Single connection so the pool never hands back a different empty DB.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self::from_pool(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            disposed: AtomicBool::new(false),
        }
    }

    async fn migrate(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for SqliteStorage {
    async fn initialize(&self) -> Result<(), CacheError> {
        self.ensure_open()?;
        self.migrate().await
    }

    async fn dispose(&self) -> Result<(), CacheError> {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.pool.close().await;
        }
        Ok(())
    }

    async fn store(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.ensure_open()?;
        let json = serde_json::to_string(&value)?;
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE
            SET value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(json)
        .bind(unix_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT value FROM cache_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.get("value");
        // Unparseable text is handed up as a bare string so the manager can
        // detect and drop the corrupt entry.
        Ok(Some(
            serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        ))
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.ensure_open()?;
        sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.ensure_open()?;
        sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, CacheError> {
        self.ensure_open()?;
        let rows = sqlx::query("SELECT key FROM cache_entries ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("key")).collect())
    }

    async fn size(&self) -> Result<usize, CacheError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM cache_entries")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }

    async fn contains_key(&self, key: &str) -> Result<bool, CacheError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT 1 FROM cache_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_keeps_enumeration_position() {
        let s = SqliteStorage::open_memory().await.unwrap();
        s.store("first", json!({"v": 1})).await.unwrap();
        s.store("second", json!({"v": 2})).await.unwrap();
        s.store("first", json!({"v": 3})).await.unwrap();
        assert_eq!(s.get_all_keys().await.unwrap(), vec!["first", "second"]);
        assert_eq!(s.retrieve("first").await.unwrap(), Some(json!({"v": 3})));
        assert_eq!(s.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_clear_empties() {
        let s = SqliteStorage::open_memory().await.unwrap();
        s.store("k", json!(true)).await.unwrap();
        s.remove("k").await.unwrap();
        s.remove("k").await.unwrap();
        assert!(!s.contains_key("k").await.unwrap());
        s.store("a", json!(1)).await.unwrap();
        s.store("b", json!(2)).await.unwrap();
        s.clear().await.unwrap();
        assert_eq!(s.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn garbage_text_surfaces_as_string() {
        let s = SqliteStorage::open_memory().await.unwrap();
        sqlx::query("INSERT INTO cache_entries (key, value, updated_at) VALUES ('bad', '{not json', 0)")
            .execute(&s.pool)
            .await
            .unwrap();
        assert_eq!(
            s.retrieve("bad").await.unwrap(),
            Some(Value::String("{not json".to_string()))
        );
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state dir").join("cache.db");
        {
            let s = SqliteStorage::open_at(&path).await.unwrap();
            s.store("request_1", json!({"x": 1})).await.unwrap();
            s.dispose().await.unwrap();
            assert!(matches!(s.size().await, Err(CacheError::Disposed)));
        }
        let s = SqliteStorage::open_at(&path).await.unwrap();
        assert!(s.contains_key("request_1").await.unwrap());
    }
}
