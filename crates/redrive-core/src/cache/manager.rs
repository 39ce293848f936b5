//! Cache manager: namespacing, capacity, eviction and expiry on top of a
//! [`CacheStorage`] backend.
//!
//! Keys are `request_<id>` for queued requests and `response_<key>` for
//! cached responses. Every value is a [`CacheEntry`] envelope.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::entry::{unix_millis, CacheEntry, CacheStatistics, CachedRequest, CachedResponse, EntryMeta};
use super::{CacheError, CachePolicy, CacheStorage};
use crate::request::{Request, Response};

const REQUEST_PREFIX: &str = "request_";
const RESPONSE_PREFIX: &str = "response_";

fn request_key(id: &str) -> String {
    format!("{REQUEST_PREFIX}{id}")
}

fn response_key(key: &str) -> String {
    format!("{RESPONSE_PREFIX}{key}")
}

fn millis(d: std::time::Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

pub struct CacheManager {
    storage: Arc<dyn CacheStorage>,
    policy: CachePolicy,
    /// Serializes capacity check, eviction and write.
    write_lock: Mutex<()>,
    disposed: AtomicBool,
}

impl CacheManager {
    /// Validate `policy` and initialize the backend.
    pub async fn new(storage: Arc<dyn CacheStorage>, policy: CachePolicy) -> Result<Self, CacheError> {
        policy.validate()?;
        storage.initialize().await?;
        Ok(Self {
            storage,
            policy,
            write_lock: Mutex::new(()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }

    /// Queue `request` for redelivery. Returns the cache id, or `None` when
    /// failed-request caching is disabled.
    pub async fn cache_request(&self, request: &Request) -> Result<Option<String>, CacheError> {
        self.ensure_open()?;
        if !self.policy.cache_failed_requests {
            return Ok(None);
        }
        let now = unix_millis();
        let cached = CachedRequest {
            id: request.id.clone(),
            request: request.clone(),
            cached_at: now,
            retry_count: 0,
            last_retry_at: None,
            last_error: None,
        };
        let entry = CacheEntry::new(cached, now, None);
        self.insert(&request_key(&request.id), &entry).await?;
        tracing::info!(id = %request.id, url = %request.url, "request queued for redelivery");
        Ok(Some(request.id.clone()))
    }

    /// All queued requests, oldest first. Undecodable entries are dropped.
    /// A listing is a scan and does not count as an access.
    pub async fn get_cached_requests(&self) -> Result<Vec<CachedRequest>, CacheError> {
        self.ensure_open()?;
        let mut out = Vec::new();
        for key in self.storage.get_all_keys().await? {
            if !key.starts_with(REQUEST_PREFIX) {
                continue;
            }
            if let Some(entry) = self.load::<CachedRequest>(&key).await? {
                out.push(entry.payload);
            }
        }
        // Stable sort keeps enumeration order for equal timestamps.
        out.sort_by_key(|r| r.cached_at);
        Ok(out)
    }

    /// Queued request `id`. A hit counts as an access for LRU/LFU.
    pub async fn get_cached_request(&self, id: &str) -> Result<Option<CachedRequest>, CacheError> {
        self.ensure_open()?;
        let key = request_key(id);
        let _guard = self.write_lock.lock().await;
        let Some(mut entry) = self.load::<CachedRequest>(&key).await? else {
            return Ok(None);
        };
        entry.touch(unix_millis());
        self.storage.store(&key, serde_json::to_value(&entry)?).await?;
        Ok(Some(entry.payload))
    }

    /// Remove a queued request; removing an unknown id is not an error.
    /// Ordered against [`mark_request_attempt`](Self::mark_request_attempt)
    /// so a removed request is never written back.
    pub async fn remove_cached_request(&self, id: &str) -> Result<(), CacheError> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        self.storage.remove(&request_key(id)).await
    }

    /// Record a failed redelivery of `id`. Returns the updated record, or
    /// `None` if the request is no longer queued.
    pub async fn mark_request_attempt(
        &self,
        id: &str,
        error: &str,
    ) -> Result<Option<CachedRequest>, CacheError> {
        self.ensure_open()?;
        let key = request_key(id);
        let _guard = self.write_lock.lock().await;
        let Some(mut entry) = self.load::<CachedRequest>(&key).await? else {
            return Ok(None);
        };
        let now = unix_millis();
        entry.payload.retry_count += 1;
        entry.payload.last_retry_at = Some(now);
        entry.payload.last_error = Some(error.to_string());
        entry.touch(now);
        self.storage.store(&key, serde_json::to_value(&entry)?).await?;
        Ok(Some(entry.payload))
    }

    /// Cache a successful response under `key`. No-op when response caching is off.
    pub async fn cache_response(&self, key: &str, response: &Response) -> Result<(), CacheError> {
        self.ensure_open()?;
        if !self.policy.cache_successful_responses {
            return Ok(());
        }
        let now = unix_millis();
        let cached = CachedResponse {
            key: key.to_string(),
            response: response.clone(),
            cached_at: now,
        };
        let entry = CacheEntry::new(cached, now, Some(self.policy.max_age));
        self.insert(&response_key(key), &entry).await
    }

    /// Cached response for `key`, or `None` when absent or older than `max_age`.
    /// Expired entries are removed on read.
    pub async fn get_cached_response(&self, key: &str) -> Result<Option<Response>, CacheError> {
        self.ensure_open()?;
        if !self.policy.cache_successful_responses {
            return Ok(None);
        }
        let storage_key = response_key(key);
        let _guard = self.write_lock.lock().await;
        let Some(mut entry) = self.load::<CachedResponse>(&storage_key).await? else {
            return Ok(None);
        };
        let now = unix_millis();
        if now - entry.payload.cached_at > millis(self.policy.max_age) {
            tracing::debug!(key, "cached response expired");
            self.storage.remove(&storage_key).await?;
            return Ok(None);
        }
        entry.touch(now);
        self.storage
            .store(&storage_key, serde_json::to_value(&entry)?)
            .await?;
        Ok(Some(entry.payload.response))
    }

    /// Drop queued requests older than the request freshness window.
    pub async fn cleanup_stale_requests(&self) -> Result<usize, CacheError> {
        self.ensure_open()?;
        let cutoff = unix_millis().saturating_sub(millis(self.policy.max_request_age));
        let stale: Vec<CachedRequest> = self
            .get_cached_requests()
            .await?
            .into_iter()
            .filter(|r| r.cached_at < cutoff)
            .collect();
        let mut removed = 0;
        let _guard = self.write_lock.lock().await;
        for request in stale {
            self.storage.remove(&request_key(&request.id)).await?;
            removed += 1;
        }
        if removed > 0 {
            tracing::info!(removed, "dropped stale queued requests");
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        self.storage.clear().await
    }

    pub async fn get_statistics(&self) -> Result<CacheStatistics, CacheError> {
        self.ensure_open()?;
        let keys = self.storage.get_all_keys().await?;
        let cached_request_count = keys.iter().filter(|k| k.starts_with(REQUEST_PREFIX)).count();
        let cached_response_count = keys.iter().filter(|k| k.starts_with(RESPONSE_PREFIX)).count();
        Ok(CacheStatistics {
            total_entries: keys.len(),
            cached_request_count,
            cached_response_count,
            max_capacity: self.policy.max_size,
        })
    }

    /// Release the backend. Idempotent; every other call fails afterwards.
    pub async fn dispose(&self) -> Result<(), CacheError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        self.storage.dispose().await
    }

    /// Write `entry` under `key`, evicting first if a new key would exceed capacity.
    async fn insert<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>) -> Result<(), CacheError> {
        let value = serde_json::to_value(entry)?;
        let _guard = self.write_lock.lock().await;
        if self.policy.max_size > 0 && !self.storage.contains_key(key).await? {
            while self.storage.size().await? >= self.policy.max_size {
                if !self.evict_one().await? {
                    break;
                }
            }
        }
        self.storage.store(key, value).await
    }

    /// Remove one entry chosen by the eviction policy. Entries whose
    /// metadata cannot be read go first.
    async fn evict_one(&self) -> Result<bool, CacheError> {
        let mut candidates = Vec::new();
        for key in self.storage.get_all_keys().await? {
            let Some(value) = self.storage.retrieve(&key).await? else {
                continue;
            };
            match serde_json::from_value::<EntryMeta>(value) {
                Ok(meta) => candidates.push((key, meta)),
                Err(_) => {
                    tracing::warn!(key = %key, "evicting unreadable cache entry");
                    self.storage.remove(&key).await?;
                    return Ok(true);
                }
            }
        }
        let Some(victim) = self.policy.eviction_policy.select(&candidates) else {
            return Ok(false);
        };
        tracing::debug!(key = victim, policy = ?self.policy.eviction_policy, "evicting cache entry");
        self.storage.remove(victim).await?;
        Ok(true)
    }

    /// Decode the entry at `key`; corrupt entries are removed and read as absent.
    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>, CacheError> {
        let Some(value) = self.storage.retrieve(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value::<CacheEntry<T>>(value) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!(key, "dropping corrupt cache entry: {}", e);
                self.storage.remove(key).await?;
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("policy", &self.policy)
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
