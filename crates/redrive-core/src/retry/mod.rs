//! Retry and backoff policy.
//!
//! This module encapsulates error classification (timeouts, throttling,
//! connection failures, HTTP status families) and exponential backoff
//! decisions so that the orchestrator and the background redrive task share
//! a consistent policy.

mod classify;
mod error;
mod kind;
mod policy;
mod run;

pub use classify::{
    classify, classify_curl_error, classify_response, classify_status, retry_after_hint,
};
pub use error::{RequestError, TransportFailure};
pub use kind::ErrorKind;
pub use policy::{BackoffStrategy, RetryDecision, RetryPolicy};
pub use run::{RetryAttempt, RetryExecutor, RetryObserver, RetryOutcome};
