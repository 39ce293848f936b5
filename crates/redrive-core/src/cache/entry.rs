//! Persisted entry shapes and statistics.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::request::{Request, Response};

/// Envelope stored for every cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub payload: T,
    /// Unix millis.
    pub created_at: i64,
    /// Unix millis; never earlier than `created_at`.
    pub last_accessed_at: i64,
    /// Starts at 1, +1 per successful read.
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T, now: i64, ttl: Option<Duration>) -> Self {
        Self {
            payload,
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
            expires_at: ttl.map(|d| now.saturating_add(d.as_millis() as i64)),
        }
    }

    /// Record one successful read.
    pub fn touch(&mut self, now: i64) {
        self.access_count += 1;
        self.last_accessed_at = now.max(self.last_accessed_at);
    }
}

/// Bookkeeping fields of any entry, whatever its payload. Used for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EntryMeta {
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub access_count: u64,
}

/// A request waiting for redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRequest {
    pub id: String,
    pub request: Request,
    /// Unix millis.
    pub cached_at: i64,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_retry_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A successful response kept for later reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub key: String,
    pub response: Response,
    /// Unix millis.
    pub cached_at: i64,
}

/// Snapshot of cache contents, recomputed from storage on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatistics {
    pub total_entries: usize,
    pub cached_request_count: usize,
    pub cached_response_count: usize,
    pub max_capacity: usize,
}

impl CacheStatistics {
    /// Fraction of capacity in use; 0 when capacity is 0.
    pub fn utilization(&self) -> f64 {
        if self.max_capacity == 0 {
            0.0
        } else {
            self.total_entries as f64 / self.max_capacity as f64
        }
    }

    pub fn export(&self) -> StatisticsExport {
        StatisticsExport {
            total_entries: self.total_entries,
            cached_requests: self.cached_request_count,
            cached_responses: self.cached_response_count,
            max_capacity: self.max_capacity,
            utilization_percentage: self.utilization() * 100.0,
        }
    }
}

/// Serializable statistics for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsExport {
    pub total_entries: usize,
    pub cached_requests: usize,
    pub cached_responses: usize,
    pub max_capacity: usize,
    pub utilization_percentage: f64,
}

/// Current time as Unix millis (for entry timestamps).
pub(crate) fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
