use super::*;
use crate::config::ConfigError;
use crate::request::{Request, Response};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn manager_with(policy: CachePolicy) -> CacheManager {
    CacheManager::new(Arc::new(MemoryStorage::new()), policy)
        .await
        .unwrap()
}

fn small(max_size: usize, eviction_policy: EvictionPolicy) -> CachePolicy {
    CachePolicy {
        max_size,
        eviction_policy,
        ..CachePolicy::default()
    }
}

/// Millisecond timestamps need a visible gap between writes.
async fn tick() {
    tokio::time::sleep(Duration::from_millis(3)).await;
}

fn request(url: &str) -> Request {
    Request::post(url).with_body("{}")
}

#[tokio::test]
async fn capacity_is_never_exceeded() {
    let m = manager_with(small(3, EvictionPolicy::Fifo)).await;
    for i in 0..10 {
        m.cache_request(&request(&format!("https://example.com/{i}")))
            .await
            .unwrap();
        m.cache_response(&format!("GET /{i}"), &Response::new(200, "ok"))
            .await
            .unwrap();
        assert!(m.get_statistics().await.unwrap().total_entries <= 3);
    }
}

#[tokio::test]
async fn fifo_evicts_oldest_insert() {
    let m = manager_with(small(3, EvictionPolicy::Fifo)).await;
    let a = request("https://example.com/a");
    let b = request("https://example.com/b");
    let c = request("https://example.com/c");
    let d = request("https://example.com/d");
    for r in [&a, &b, &c] {
        m.cache_request(r).await.unwrap();
        tick().await;
    }
    // Touching A does not save it under FIFO.
    m.mark_request_attempt(&a.id, "still offline").await.unwrap();
    m.cache_request(&d).await.unwrap();

    let ids: Vec<String> = m
        .get_cached_requests()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![b.id, c.id, d.id]);
}

#[tokio::test]
async fn lru_evicts_least_recently_read() {
    let m = manager_with(small(3, EvictionPolicy::Lru)).await;
    for key in ["a", "b", "c"] {
        m.cache_response(key, &Response::new(200, key)).await.unwrap();
        tick().await;
    }
    assert!(m.get_cached_response("a").await.unwrap().is_some());
    tick().await;
    m.cache_response("d", &Response::new(200, "d")).await.unwrap();

    assert!(m.get_cached_response("b").await.unwrap().is_none());
    for key in ["a", "c", "d"] {
        assert!(m.get_cached_response(key).await.unwrap().is_some(), "{key}");
    }
}

#[tokio::test]
async fn lfu_evicts_least_read() {
    let m = manager_with(small(3, EvictionPolicy::Lfu)).await;
    for key in ["a", "b", "c"] {
        m.cache_response(key, &Response::new(200, key)).await.unwrap();
        tick().await;
    }
    m.get_cached_response("a").await.unwrap();
    m.get_cached_response("a").await.unwrap();
    m.get_cached_response("c").await.unwrap();
    m.cache_response("d", &Response::new(200, "d")).await.unwrap();

    let keys = m.storage().get_all_keys().await.unwrap();
    assert_eq!(keys, vec!["response_a", "response_c", "response_d"]);
}

#[tokio::test]
async fn overwriting_a_key_does_not_evict() {
    let m = manager_with(small(2, EvictionPolicy::Fifo)).await;
    m.cache_response("a", &Response::new(200, "1")).await.unwrap();
    m.cache_response("b", &Response::new(200, "1")).await.unwrap();
    m.cache_response("a", &Response::new(200, "2")).await.unwrap();
    assert_eq!(
        m.get_cached_response("a").await.unwrap(),
        Some(Response::new(200, "2"))
    );
    assert!(m.get_cached_response("b").await.unwrap().is_some());
}

#[tokio::test]
async fn expired_response_reads_as_absent_and_is_removed() {
    let m = manager_with(CachePolicy {
        max_age: Duration::from_millis(1),
        ..CachePolicy::default()
    })
    .await;
    m.cache_response("GET https://example.com", &Response::new(200, "body"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        m.get_cached_response("GET https://example.com").await.unwrap(),
        None
    );
    assert!(!m
        .storage()
        .contains_key("response_GET https://example.com")
        .await
        .unwrap());
}

#[tokio::test]
async fn reads_bump_access_count_by_one() {
    let m = manager_with(CachePolicy::default()).await;
    m.cache_response("k", &Response::new(200, "x")).await.unwrap();
    m.get_cached_response("k").await.unwrap();
    let raw = m.storage().retrieve("response_k").await.unwrap().unwrap();
    let entry: CacheEntry<CachedResponse> = serde_json::from_value(raw).unwrap();
    assert_eq!(entry.access_count, 2);
    assert!(entry.last_accessed_at >= entry.created_at);
}

#[tokio::test]
async fn corrupt_entries_are_dropped_on_read() {
    let m = manager_with(CachePolicy::default()).await;
    let good = request("https://example.com/good");
    m.cache_request(&good).await.unwrap();
    m.storage()
        .store("request_bad", json!("not an entry"))
        .await
        .unwrap();
    m.storage()
        .store("request_worse", json!({"payload": 42}))
        .await
        .unwrap();

    let queued = m.get_cached_requests().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, good.id);
    assert!(!m.storage().contains_key("request_bad").await.unwrap());
    assert!(!m.storage().contains_key("request_worse").await.unwrap());
}

#[tokio::test]
async fn corrupt_entries_are_evicted_first() {
    let m = manager_with(small(2, EvictionPolicy::Fifo)).await;
    let a = request("https://example.com/a");
    m.cache_request(&a).await.unwrap();
    tick().await;
    m.storage().store("response_junk", json!("junk")).await.unwrap();
    m.cache_request(&request("https://example.com/b")).await.unwrap();

    assert!(m.get_cached_request(&a.id).await.unwrap().is_some());
    assert!(!m.storage().contains_key("response_junk").await.unwrap());
}

#[tokio::test]
async fn gating_flags_turn_caching_off() {
    let m = manager_with(CachePolicy {
        cache_failed_requests: false,
        cache_successful_responses: false,
        ..CachePolicy::default()
    })
    .await;
    assert_eq!(m.cache_request(&request("https://example.com")).await.unwrap(), None);
    m.cache_response("k", &Response::new(200, "x")).await.unwrap();
    assert_eq!(m.get_statistics().await.unwrap().total_entries, 0);
    assert_eq!(m.get_cached_response("k").await.unwrap(), None);
}

#[tokio::test]
async fn mark_request_attempt_bumps_once() {
    let m = manager_with(CachePolicy::default()).await;
    let r = request("https://example.com");
    let id = m.cache_request(&r).await.unwrap().unwrap();
    assert_eq!(id, r.id);

    let updated = m.mark_request_attempt(&id, "503 upstream").await.unwrap().unwrap();
    assert_eq!(updated.retry_count, 1);
    assert_eq!(updated.last_error.as_deref(), Some("503 upstream"));
    assert!(updated.last_retry_at.is_some());

    let stored = m.get_cached_request(&id).await.unwrap().unwrap();
    assert_eq!(stored.retry_count, 1);
    assert_eq!(stored.request, r);

    m.remove_cached_request(&id).await.unwrap();
    m.remove_cached_request(&id).await.unwrap();
    assert_eq!(m.mark_request_attempt(&id, "gone").await.unwrap(), None);
}

#[tokio::test]
async fn stale_requests_are_swept() {
    let m = manager_with(CachePolicy {
        max_request_age: Duration::from_millis(5),
        ..CachePolicy::default()
    })
    .await;
    m.cache_request(&request("https://example.com/old")).await.unwrap();
    m.cache_response("kept", &Response::new(200, "x")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fresh = request("https://example.com/new");
    m.cache_request(&fresh).await.unwrap();

    assert_eq!(m.cleanup_stale_requests().await.unwrap(), 1);
    let queued = m.get_cached_requests().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, fresh.id);
    assert_eq!(m.get_statistics().await.unwrap().cached_response_count, 1);
}

#[tokio::test]
async fn statistics_count_both_namespaces() {
    let m = manager_with(small(10, EvictionPolicy::Fifo)).await;
    m.cache_request(&request("https://example.com/1")).await.unwrap();
    m.cache_request(&request("https://example.com/2")).await.unwrap();
    m.cache_response("k", &Response::new(200, "x")).await.unwrap();
    let stats = m.get_statistics().await.unwrap();
    assert_eq!(stats.total_entries, 3);
    assert_eq!(stats.cached_request_count, 2);
    assert_eq!(stats.cached_response_count, 1);
    assert_eq!(stats.max_capacity, 10);
    assert!((stats.export().utilization_percentage - 30.0).abs() < 1e-9);

    m.clear().await.unwrap();
    assert_eq!(m.get_statistics().await.unwrap().total_entries, 0);
}

#[tokio::test]
async fn dispose_fails_fast_afterwards() {
    let m = manager_with(CachePolicy::default()).await;
    m.dispose().await.unwrap();
    m.dispose().await.unwrap();
    assert!(matches!(
        m.cache_request(&request("https://example.com")).await,
        Err(CacheError::Disposed)
    ));
    assert!(matches!(m.get_statistics().await, Err(CacheError::Disposed)));
}

#[tokio::test]
async fn invalid_policy_is_rejected() {
    let err = CacheManager::new(Arc::new(MemoryStorage::new()), small(0, EvictionPolicy::Fifo))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CacheError::Config(ConfigError::ZeroCapacity(_))
    ));
}

#[tokio::test]
async fn sqlite_backend_keeps_fifo_order() {
    let storage = Arc::new(SqliteStorage::open_memory().await.unwrap());
    let m = CacheManager::new(storage, small(2, EvictionPolicy::Fifo))
        .await
        .unwrap();
    let a = request("https://example.com/a");
    let b = request("https://example.com/b");
    let c = request("https://example.com/c");
    for r in [&a, &b, &c] {
        m.cache_request(r).await.unwrap();
        tick().await;
    }
    let ids: Vec<String> = m
        .get_cached_requests()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![b.id, c.id]);
}

#[tokio::test]
async fn file_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let r = request("https://example.com/a");
    {
        let m = CacheManager::new(Arc::new(JsonFileStorage::new(&path)), CachePolicy::default())
            .await
            .unwrap();
        m.cache_request(&r).await.unwrap();
        m.dispose().await.unwrap();
    }
    let m = CacheManager::new(Arc::new(JsonFileStorage::new(&path)), CachePolicy::default())
        .await
        .unwrap();
    let queued = m.get_cached_requests().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].request, r);
}

/// Memory store whose reads take a while, to widen read-modify-write windows.
struct SlowReads {
    inner: MemoryStorage,
    delay: Duration,
}

#[async_trait::async_trait]
impl CacheStorage for SlowReads {
    async fn initialize(&self) -> Result<(), CacheError> {
        self.inner.initialize().await
    }
    async fn dispose(&self) -> Result<(), CacheError> {
        self.inner.dispose().await
    }
    async fn store(&self, key: &str, value: serde_json::Value) -> Result<(), CacheError> {
        self.inner.store(key, value).await
    }
    async fn retrieve(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.retrieve(key).await
    }
    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key).await
    }
    async fn clear(&self) -> Result<(), CacheError> {
        self.inner.clear().await
    }
    async fn get_all_keys(&self) -> Result<Vec<String>, CacheError> {
        self.inner.get_all_keys().await
    }
    async fn size(&self) -> Result<usize, CacheError> {
        self.inner.size().await
    }
    async fn contains_key(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.contains_key(key).await
    }
}

#[tokio::test]
async fn removal_during_attempt_bookkeeping_stays_removed() {
    let storage = Arc::new(SlowReads {
        inner: MemoryStorage::new(),
        delay: Duration::from_millis(50),
    });
    let m = Arc::new(CacheManager::new(storage, CachePolicy::default()).await.unwrap());
    let r = request("https://example.com/delivered");
    m.cache_request(&r).await.unwrap();

    let marking = {
        let m = Arc::clone(&m);
        let id = r.id.clone();
        tokio::spawn(async move { m.mark_request_attempt(&id, "503").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    m.remove_cached_request(&r.id).await.unwrap();

    let marked = marking.await.unwrap().unwrap();
    assert_eq!(marked.map(|c| c.retry_count), Some(1));
    assert!(!m.storage().contains_key(&request_key_for(&r)).await.unwrap());
    assert!(m.get_cached_requests().await.unwrap().is_empty());
}

fn request_key_for(r: &Request) -> String {
    format!("request_{}", r.id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_respect_capacity() {
    let m = Arc::new(manager_with(small(3, EvictionPolicy::Fifo)).await);
    let handles: Vec<_> = (0..50)
        .map(|i| {
            let m = Arc::clone(&m);
            tokio::spawn(async move {
                m.cache_request(&request(&format!("https://example.com/{i}")))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(m.storage().size().await.unwrap(), 3);
    assert_eq!(m.get_cached_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn request_read_counts_as_access() {
    let m = manager_with(small(3, EvictionPolicy::Lru)).await;
    let a = request("https://example.com/a");
    let b = request("https://example.com/b");
    let c = request("https://example.com/c");
    for r in [&a, &b, &c] {
        m.cache_request(r).await.unwrap();
        tick().await;
    }
    assert!(m.get_cached_request(&a.id).await.unwrap().is_some());
    let raw = m.storage().retrieve(&request_key_for(&a)).await.unwrap().unwrap();
    let entry: CacheEntry<CachedRequest> = serde_json::from_value(raw).unwrap();
    assert_eq!(entry.access_count, 2);

    tick().await;
    m.cache_request(&request("https://example.com/d")).await.unwrap();
    assert!(m.get_cached_request(&a.id).await.unwrap().is_some());
    assert!(m.get_cached_request(&b.id).await.unwrap().is_none());
}
