//! Request orchestration: validate, deliver with retries, queue on failure,
//! redrive the queue later.
//!
//! A request moves through `validate -> send (with retries)` and ends either
//! delivered or queued in the offline cache. Queued requests are redriven by
//! [`RequestOrchestrator::process_cached_requests`] or the background task;
//! a redrive success removes the entry, a failure bumps its retry count.

mod background;


use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::{self, CacheError, CacheManager};
use crate::config::{ConfigError, RedriveConfig};
use crate::control::CancelToken;
use crate::request::{Request, Response};
use crate::retry::{classify_response, ErrorKind, RequestError, RetryExecutor, RetryObserver, RetryPolicy};
use crate::transport::{CurlTransport, Transport};
use crate::validate::{BasicValidator, Validator};

use background::BackgroundTask;

const DEFAULT_REPROCESS_INTERVAL: Duration = Duration::from_secs(30);

/// How a `send_request` call ended when it did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A 2xx response was received.
    Sent(Response),
    /// Retries were exhausted on a retryable error; the request is queued
    /// under `id` and will be redriven later.
    Queued { id: String, error: RequestError },
}

impl Delivery {
    pub fn response(&self) -> Option<&Response> {
        match self {
            Delivery::Sent(r) => Some(r),
            Delivery::Queued { .. } => None,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Delivery::Queued { .. })
    }
}

/// Result of one redrive pass over the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReprocessReport {
    pub stale_removed: usize,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

struct Inner {
    transport: Arc<dyn Transport>,
    validator: Arc<dyn Validator>,
    cache: Arc<CacheManager>,
    executor: RetryExecutor,
    cancel: CancelToken,
    base_url: Option<String>,
    auth_headers: BTreeMap<String, String>,
}

impl Inner {
    /// Copy of `request` with auth headers added. Headers already on the
    /// request win. The queued copy never carries them.
    fn with_auth(&self, request: &Request) -> Request {
        let mut prepared = request.clone();
        for (name, value) in &self.auth_headers {
            let present = prepared
                .headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case(name));
            if !present {
                prepared.headers.insert(name.clone(), value.clone());
            }
        }
        prepared
    }

    /// Validate then send with retries. Non-2xx responses become classified errors.
    async fn deliver(&self, request: &Request) -> Result<Response, RequestError> {
        let prepared = self.with_auth(request);
        self.validator.validate(&prepared)?;
        let transport = &self.transport;
        let prepared = &prepared;
        self.executor
            .execute(|| async move {
                match transport.send(prepared).await {
                    Ok(response) if response.is_success() => Ok(response),
                    Ok(response) => Err(classify_response(&response)),
                    Err(failure) => Err(RequestError::from(failure)),
                }
            })
            .await
    }

    async fn store_response(&self, request: &Request, response: &Response) {
        if let Err(e) = self
            .cache
            .cache_response(&request.response_cache_key(), response)
            .await
        {
            tracing::warn!(id = %request.id, "failed to cache response: {}", e);
        }
    }

    async fn reprocess(&self) -> Result<ReprocessReport, CacheError> {
        let mut report = ReprocessReport {
            stale_removed: self.cache.cleanup_stale_requests().await?,
            ..ReprocessReport::default()
        };
        for cached in self.cache.get_cached_requests().await? {
            if self.cancel.is_cancelled() {
                break;
            }
            let result = self.deliver(&cached.request).await;
            if matches!(&result, Err(e) if e.is_cancelled()) {
                break;
            }
            report.attempted += 1;
            match result {
                Ok(response) => {
                    self.cache.remove_cached_request(&cached.id).await?;
                    self.store_response(&cached.request, &response).await;
                    report.delivered += 1;
                    tracing::info!(
                        id = %cached.id,
                        retry_count = cached.retry_count,
                        status = response.status,
                        "queued request delivered"
                    );
                }
                Err(e) => {
                    self.cache.mark_request_attempt(&cached.id, &e.to_string()).await?;
                    report.failed += 1;
                    tracing::info!(id = %cached.id, kind = %e.kind, "redrive failed: {}", e.message);
                }
            }
        }
        Ok(report)
    }
}

/// Sends requests with retries and keeps undeliverable ones for later.
pub struct RequestOrchestrator {
    inner: Arc<Inner>,
    interval: Mutex<Duration>,
    background: Mutex<Option<BackgroundTask>>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for RequestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("base_url", &self.inner.base_url)
            .field("policy", self.inner.executor.policy())
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn disposed_error() -> RequestError {
    RequestError::new(ErrorKind::Configuration, "orchestrator has been disposed")
}

impl RequestOrchestrator {
    pub fn builder(transport: Arc<dyn Transport>, cache: Arc<CacheManager>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(transport, cache)
    }

    /// Build everything from the config file: storage backend, cache
    /// manager, curl transport and policies.
    pub async fn from_config(config: &RedriveConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let storage = cache::open_storage(config.storage).await?;
        let cache = Arc::new(CacheManager::new(storage, config.cache_policy()?).await?);
        let transport = Arc::new(CurlTransport::new(config.request_timeout()));
        let mut builder = Self::builder(transport, cache)
            .retry_policy(config.retry_policy()?)
            .auth_headers(config.auth_headers.clone())
            .reprocess_interval(config.reprocess_interval());
        if let Some(base) = &config.base_url {
            builder = builder.base_url(base.clone());
        }
        Ok(builder.build()?)
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.inner.cache
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.inner.executor.policy()
    }

    fn ensure_open(&self) -> Result<(), RequestError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(disposed_error());
        }
        Ok(())
    }

    /// Deliver `request`.
    ///
    /// Validation failures and non-retryable errors are returned as `Err`.
    /// A retryable error that survives every retry queues the request when
    /// offline caching is on, giving `Ok(Delivery::Queued)`.
    pub async fn send_request(&self, request: Request) -> Result<Delivery, RequestError> {
        self.ensure_open()?;
        let inner = &self.inner;
        match inner.deliver(&request).await {
            Ok(response) => {
                inner.store_response(&request, &response).await;
                Ok(Delivery::Sent(response))
            }
            Err(error) => {
                let policy = inner.cache.policy();
                let queueable = !error.kind.is_always_terminal()
                    && inner.executor.policy().is_retryable(error.kind)
                    && policy.enable_offline_cache;
                if queueable {
                    match inner.cache.cache_request(&request).await {
                        Ok(Some(id)) => return Ok(Delivery::Queued { id, error }),
                        Ok(None) => {}
                        Err(e) => tracing::warn!(id = %request.id, "failed to queue request: {}", e),
                    }
                }
                Err(error)
            }
        }
    }

    /// POST `payload` as JSON to `path` under the configured base URL.
    pub async fn send_message(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<Delivery, RequestError> {
        self.ensure_open()?;
        let base = self
            .inner
            .base_url
            .as_deref()
            .ok_or(ConfigError::MissingBaseUrl)?;
        let url = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.send_request(Request::post(url).with_json(payload)).await
    }

    /// Cached response for `request`, if a fresh one exists.
    pub async fn cached_response(&self, request: &Request) -> Result<Option<Response>, RequestError> {
        self.ensure_open()?;
        Ok(self
            .inner
            .cache
            .get_cached_response(&request.response_cache_key())
            .await?)
    }

    /// One redrive pass: drop stale entries, then resend each queued request
    /// oldest first without queueing it again.
    pub async fn process_cached_requests(&self) -> Result<ReprocessReport, RequestError> {
        self.ensure_open()?;
        Ok(self.inner.reprocess().await?)
    }

    /// Start the periodic redrive task. Does nothing if it is already running.
    pub fn start_background(&self) -> Result<(), RequestError> {
        self.ensure_open()?;
        let mut slot = self
            .background
            .lock()
            .map_err(|e| RequestError::new(ErrorKind::Unknown, e.to_string()))?;
        if slot.is_some() {
            return Ok(());
        }
        let period = self.interval();
        let inner = Arc::clone(&self.inner);
        *slot = Some(BackgroundTask::spawn(period, move || {
            let inner = Arc::clone(&inner);
            async move {
                match inner.reprocess().await {
                    Ok(report) if report.attempted > 0 || report.stale_removed > 0 => {
                        tracing::info!(
                            attempted = report.attempted,
                            delivered = report.delivered,
                            failed = report.failed,
                            stale_removed = report.stale_removed,
                            "redrive pass finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("redrive pass failed: {}", e),
                }
            }
        }));
        tracing::info!(interval_ms = period.as_millis() as u64, "background redrive started");
        Ok(())
    }

    pub fn is_background_running(&self) -> bool {
        self.background
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    fn interval(&self) -> Duration {
        self.interval
            .lock()
            .map(|d| *d)
            .unwrap_or(DEFAULT_REPROCESS_INTERVAL)
    }

    /// Change the redrive period. Applies to a running task immediately.
    pub fn set_reprocess_interval(&self, period: Duration) -> Result<(), ConfigError> {
        if period.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if let Ok(mut current) = self.interval.lock() {
            *current = period;
        }
        if let Ok(slot) = self.background.lock() {
            if let Some(task) = slot.as_ref() {
                task.set_interval(period);
            }
        }
        Ok(())
    }

    /// Stop the background task, cancel retry waits and in-flight transfers.
    /// Idempotent. The cache manager is left open for its owner.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.cancel.cancel();
        self.inner.transport.cancel_all();
        let task = self.background.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            task.stop().await;
        }
        tracing::debug!("orchestrator disposed");
    }
}

/// Builder for [`RequestOrchestrator`].
pub struct OrchestratorBuilder {
    transport: Arc<dyn Transport>,
    cache: Arc<CacheManager>,
    validator: Arc<dyn Validator>,
    policy: RetryPolicy,
    observer: Option<RetryObserver>,
    base_url: Option<String>,
    auth_headers: BTreeMap<String, String>,
    reprocess_interval: Duration,
}

impl OrchestratorBuilder {
    fn new(transport: Arc<dyn Transport>, cache: Arc<CacheManager>) -> Self {
        Self {
            transport,
            cache,
            validator: Arc::new(BasicValidator),
            policy: RetryPolicy::default(),
            observer: None,
            base_url: None,
            auth_headers: BTreeMap::new(),
            reprocess_interval: DEFAULT_REPROCESS_INTERVAL,
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Called before every retry sleep with `(attempt, kind, delay)`.
    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32, ErrorKind, Duration) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_headers.insert(name.into(), value.into());
        self
    }

    pub fn auth_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.auth_headers.extend(headers);
        self
    }

    pub fn reprocess_interval(mut self, period: Duration) -> Self {
        self.reprocess_interval = period;
        self
    }

    pub fn build(self) -> Result<RequestOrchestrator, ConfigError> {
        if self.reprocess_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if let Some(base) = &self.base_url {
            url::Url::parse(base).map_err(|e| ConfigError::InvalidBaseUrl {
                url: base.clone(),
                reason: e.to_string(),
            })?;
        }
        let cancel = CancelToken::new();
        let mut executor = RetryExecutor::new(self.policy).with_cancel_token(cancel.clone());
        if let Some(observer) = self.observer {
            executor = executor.with_observer(move |attempt, kind, delay| observer(attempt, kind, delay));
        }
        Ok(RequestOrchestrator {
            inner: Arc::new(Inner {
                transport: self.transport,
                validator: self.validator,
                cache: self.cache,
                executor,
                cancel,
                base_url: self.base_url,
                auth_headers: self.auth_headers,
            }),
            interval: Mutex::new(self.reprocess_interval),
            background: Mutex::new(None),
            disposed: AtomicBool::new(false),
        })
    }
}
