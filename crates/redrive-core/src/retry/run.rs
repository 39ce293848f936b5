//! Retry loop: run an async operation until success or the policy says stop.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::RequestError;
use super::kind::ErrorKind;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::CancelToken;

/// Callback invoked before each retry sleep with `(attempt, kind, delay)`.
pub type RetryObserver = Arc<dyn Fn(u32, ErrorKind, Duration) + Send + Sync>;

/// One execution attempt, recorded after it finished.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt_number: u32,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<RequestError>,
}

/// Full report of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, RequestError>,
    pub total_duration: Duration,
    pub total_attempts: u32,
    pub attempts: Vec<RetryAttempt>,
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, RequestError> {
        self.result
    }
}

/// Drives a fallible async operation through a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    observer: Option<RetryObserver>,
    cancel: CancelToken,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            observer: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32, ErrorKind, Duration) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `op` with retries and return its value or the terminal error.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RequestError>,
    {
        self.execute_with_outcome(op).await.into_result()
    }

    /// Run `op` with retries and report every attempt. Never fails; the
    /// terminal error, if any, is in `result`.
    ///
    /// Errors that are already [`RequestError`]s keep their kind; other error
    /// types are classified through their `Into<RequestError>` conversion.
    pub async fn execute_with_outcome<T, E, F, Fut>(&self, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RequestError>,
    {
        let started = Instant::now();
        let mut attempts: Vec<RetryAttempt> = Vec::new();
        let mut attempt = 0u32;

        let result = loop {
            if self.cancel.is_cancelled() {
                break Err(RequestError::cancelled());
            }

            let attempt_started = Instant::now();
            let err: RequestError = match op().await {
                Ok(value) => {
                    attempts.push(RetryAttempt {
                        attempt_number: attempt + 1,
                        duration: attempt_started.elapsed(),
                        success: true,
                        error: None,
                    });
                    break Ok(value);
                }
                Err(e) => e.into(),
            };
            attempts.push(RetryAttempt {
                attempt_number: attempt + 1,
                duration: attempt_started.elapsed(),
                success: false,
                error: Some(err.clone()),
            });

            match self.policy.decide(attempt, &err) {
                RetryDecision::NoRetry => {
                    tracing::debug!(attempt = attempt + 1, kind = %err.kind, "giving up: {}", err.message);
                    break Err(err);
                }
                RetryDecision::RetryAfter(delay) => {
                    if let Some(observer) = &self.observer {
                        observer(attempt, err.kind, delay);
                    }
                    tracing::debug!(
                        attempt = attempt + 1,
                        kind = %err.kind,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying: {}",
                        err.message
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => break Err(RequestError::cancelled()),
                    }
                    attempt += 1;
                }
            }
        };

        RetryOutcome {
            result,
            total_duration: started.elapsed(),
            total_attempts: attempts.len() as u32,
            attempts,
        }
    }
}
