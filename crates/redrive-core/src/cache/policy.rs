use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::entry::EntryMeta;
use crate::config::ConfigError;

/// Rule for choosing which entry to drop when the cache is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Oldest `created_at`.
    #[default]
    Fifo,
    /// Oldest `last_accessed_at`.
    Lru,
    /// Lowest `access_count`, then oldest `last_accessed_at`.
    Lfu,
}

impl EvictionPolicy {
    /// Pick the victim among `candidates`, which are in storage enumeration
    /// order. Ties go to the entry enumerated first.
    pub fn select<'a>(&self, candidates: &'a [(String, EntryMeta)]) -> Option<&'a str> {
        let victim = match self {
            EvictionPolicy::Fifo => candidates.iter().min_by_key(|(_, m)| m.created_at),
            EvictionPolicy::Lru => candidates.iter().min_by_key(|(_, m)| m.last_accessed_at),
            EvictionPolicy::Lfu => candidates
                .iter()
                .min_by_key(|(_, m)| (m.access_count, m.last_accessed_at)),
        };
        victim.map(|(key, _)| key.as_str())
    }
}

/// Capacity, expiry and gating rules enforced by [`CacheManager`](super::CacheManager).
#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicy {
    /// How long a cached response stays valid.
    pub max_age: Duration,
    /// Maximum number of entries across both namespaces.
    pub max_size: usize,
    /// Enqueue retry-exhausted requests for redelivery.
    pub enable_offline_cache: bool,
    pub eviction_policy: EvictionPolicy,
    pub cache_successful_responses: bool,
    pub cache_failed_requests: bool,
    /// How long a queued request may wait before the stale sweep drops it.
    pub max_request_age: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60 * 60),
            max_size: 100,
            enable_offline_cache: true,
            eviction_policy: EvictionPolicy::Fifo,
            cache_successful_responses: true,
            cache_failed_requests: true,
            max_request_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CachePolicy {
    /// A zero-capacity cache cannot honour either caching flag.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            if self.cache_failed_requests {
                return Err(ConfigError::ZeroCapacity("cache_failed_requests"));
            }
            if self.cache_successful_responses {
                return Err(ConfigError::ZeroCapacity("cache_successful_responses"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(created_at: i64, last_accessed_at: i64, access_count: u64) -> EntryMeta {
        EntryMeta {
            created_at,
            last_accessed_at,
            access_count,
        }
    }

    fn candidates() -> Vec<(String, EntryMeta)> {
        vec![
            ("a".to_string(), meta(10, 50, 5)),
            ("b".to_string(), meta(20, 30, 1)),
            ("c".to_string(), meta(30, 40, 1)),
        ]
    }

    #[test]
    fn fifo_picks_oldest_created() {
        assert_eq!(EvictionPolicy::Fifo.select(&candidates()), Some("a"));
    }

    #[test]
    fn lru_picks_least_recently_accessed() {
        assert_eq!(EvictionPolicy::Lru.select(&candidates()), Some("b"));
    }

    #[test]
    fn lfu_picks_least_used_then_least_recent() {
        assert_eq!(EvictionPolicy::Lfu.select(&candidates()), Some("b"));
    }

    #[test]
    fn ties_go_to_first_enumerated() {
        let c = vec![
            ("first".to_string(), meta(1, 1, 1)),
            ("second".to_string(), meta(1, 1, 1)),
        ];
        for policy in [EvictionPolicy::Fifo, EvictionPolicy::Lru, EvictionPolicy::Lfu] {
            assert_eq!(policy.select(&c), Some("first"));
        }
        assert_eq!(EvictionPolicy::Fifo.select(&[]), None);
    }

    #[test]
    fn zero_capacity_requires_caching_disabled() {
        let mut p = CachePolicy {
            max_size: 0,
            ..CachePolicy::default()
        };
        assert_eq!(
            p.validate(),
            Err(ConfigError::ZeroCapacity("cache_failed_requests"))
        );
        p.cache_failed_requests = false;
        assert_eq!(
            p.validate(),
            Err(ConfigError::ZeroCapacity("cache_successful_responses"))
        );
        p.cache_successful_responses = false;
        assert_eq!(p.validate(), Ok(()));
    }
}
