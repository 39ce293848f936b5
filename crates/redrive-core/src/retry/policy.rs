use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

use super::error::RequestError;
use super::kind::ErrorKind;
use crate::config::ConfigError;

/// Upper bound of the random jitter, as a fraction of the computed delay.
const JITTER_FRACTION: f64 = 0.10;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// `base_delay * multiplier^attempt`, capped at `max_delay`.
    Exponential {
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    },
    /// Same delay before every retry.
    Fixed(Duration),
    /// Never retry.
    None,
}

/// Retry policy: attempt bound, backoff strategy and per-kind retryability.
///
/// Attempt indices are 0-based: index 0 is the initial attempt, so a policy
/// with `max_attempts = 3` allows the initial attempt plus three retries.
/// Policies hold no per-call state and can be shared between concurrent
/// deliveries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
    retryable: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential {
                base_delay: Duration::from_secs(1),
                multiplier: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: true,
            retryable: default_retryable_kinds(),
        }
    }
}

fn default_retryable_kinds() -> HashSet<ErrorKind> {
    ErrorKind::ALL
        .into_iter()
        .filter(|k| k.default_retryable())
        .collect()
}

impl RetryPolicy {
    /// Exponential backoff. Validates `base_delay > 0`, `multiplier >= 1` and
    /// `max_delay >= base_delay`.
    pub fn exponential(
        max_attempts: u32,
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Result<Self, ConfigError> {
        if base_delay.is_zero() {
            return Err(ConfigError::NonPositiveBaseDelay(base_delay.as_secs_f64()));
        }
        if !(multiplier >= 1.0) || !multiplier.is_finite() {
            return Err(ConfigError::MultiplierBelowOne(multiplier));
        }
        if max_delay < base_delay {
            return Err(ConfigError::MaxDelayBelowBase {
                base: base_delay.as_secs_f64(),
                max: max_delay.as_secs_f64(),
            });
        }
        Ok(Self {
            max_attempts,
            strategy: BackoffStrategy::Exponential {
                base_delay,
                multiplier,
                max_delay,
            },
            jitter: false,
            retryable: default_retryable_kinds(),
        })
    }

    /// Constant delay between retries; same retryability rules as exponential.
    /// The delay must be non-zero.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Result<Self, ConfigError> {
        if delay.is_zero() {
            return Err(ConfigError::NonPositiveBaseDelay(0.0));
        }
        Ok(Self {
            max_attempts,
            strategy: BackoffStrategy::Fixed(delay),
            jitter: false,
            retryable: default_retryable_kinds(),
        })
    }

    /// Zero retries; every failure is terminal.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            strategy: BackoffStrategy::None,
            jitter: false,
            retryable: default_retryable_kinds(),
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Override retryability for one kind. Validation and configuration
    /// failures stay terminal regardless.
    pub fn with_retryable(mut self, kind: ErrorKind, retryable: bool) -> Self {
        if retryable && !kind.is_always_terminal() {
            self.retryable.insert(kind);
        } else {
            self.retryable.remove(&kind);
        }
        self
    }

    /// Replace the retryable set wholesale.
    pub fn with_retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = kinds
            .into_iter()
            .filter(|k| !k.is_always_terminal())
            .collect();
        self
    }

    /// Whether this policy ever retries (or enqueues) failures of `kind`.
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// `attempt` is the 0-based index of the attempt that just failed.
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        if matches!(self.strategy, BackoffStrategy::None) || attempt >= self.max_attempts {
            return false;
        }
        self.is_retryable(kind)
    }

    /// Delay before the attempt following `attempt`, without a server hint.
    pub fn delay_for(&self, attempt: u32, kind: ErrorKind) -> Duration {
        self.delay_with_hint(attempt, kind, None)
    }

    /// Delay before the next attempt. Rate-limited failures wait twice as
    /// long, or for the server's `Retry-After` when that is longer.
    pub fn delay_with_hint(
        &self,
        attempt: u32,
        kind: ErrorKind,
        retry_after: Option<Duration>,
    ) -> Duration {
        let raw = match self.strategy {
            BackoffStrategy::Exponential {
                base_delay,
                multiplier,
                max_delay,
            } => {
                let exp = multiplier.powi(attempt.min(i32::MAX as u32) as i32);
                let secs = (base_delay.as_secs_f64() * exp).min(max_delay.as_secs_f64());
                Duration::from_secs_f64(secs)
            }
            BackoffStrategy::Fixed(delay) => delay,
            BackoffStrategy::None => return Duration::ZERO,
        };

        let mut delay = if self.jitter {
            let fraction = rand::thread_rng().gen_range(0.0..=JITTER_FRACTION);
            raw + raw.mul_f64(fraction)
        } else {
            raw
        };

        if kind == ErrorKind::RateLimited {
            delay = delay.saturating_mul(2);
            if let Some(hint) = retry_after {
                delay = delay.max(hint);
            }
        }
        delay
    }

    /// Combined decision for a classified failure of attempt `attempt`.
    pub fn decide(&self, attempt: u32, error: &RequestError) -> RetryDecision {
        if !self.should_retry(attempt, error.kind) {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay_with_hint(attempt, error.kind, error.retry_after))
    }
}
