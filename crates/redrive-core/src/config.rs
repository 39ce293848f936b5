use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CachePolicy, EvictionPolicy};
use crate::retry::{ErrorKind, RetryPolicy};

/// Invalid retry, cache or orchestrator parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("retry base delay must be > 0 (got {0}s)")]
    NonPositiveBaseDelay(f64),
    #[error("retry multiplier must be >= 1 (got {0})")]
    MultiplierBelowOne(f64),
    #[error("retry max delay ({max}s) must be >= base delay ({base}s)")]
    MaxDelayBelowBase { base: f64, max: f64 },
    #[error("cache max_size is 0 but {0} is enabled")]
    ZeroCapacity(&'static str),
    #[error("{0} must be a finite, non-negative number of seconds")]
    InvalidSeconds(&'static str),
    #[error("reprocess interval must be > 0")]
    ZeroInterval,
    #[error("request timeout must be > 0")]
    ZeroTimeout,
    #[error("invalid base url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("send_message needs a base url")]
    MissingBaseUrl,
}

/// Backoff strategy name in config.toml.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    #[default]
    Exponential,
    Fixed,
    None,
}

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_attempts: u32,
    /// Base delay in seconds for backoff (e.g. 0.25 = 250ms). Also the fixed delay.
    pub base_delay_secs: f64,
    /// Growth factor per attempt for exponential backoff.
    pub multiplier: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: f64,
    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
    #[serde(default)]
    pub strategy: RetryStrategy,
    /// Error kinds to retry; if missing, each kind's default retryability applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on: Option<Vec<ErrorKind>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            multiplier: 2.0,
            max_delay_secs: 30.0,
            jitter: true,
            strategy: RetryStrategy::Exponential,
            retry_on: None,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let base = secs("retry.base_delay_secs", self.base_delay_secs)?;
        let max = secs("retry.max_delay_secs", self.max_delay_secs)?;
        let policy = match self.strategy {
            RetryStrategy::Exponential => {
                RetryPolicy::exponential(self.max_attempts, base, self.multiplier, max)?
                    .with_jitter(self.jitter)
            }
            RetryStrategy::Fixed => {
                RetryPolicy::fixed(self.max_attempts, base)?.with_jitter(self.jitter)
            }
            RetryStrategy::None => RetryPolicy::no_retry(),
        };
        Ok(match &self.retry_on {
            Some(kinds) => policy.with_retryable_kinds(kinds.iter().copied()),
            None => policy,
        })
    }
}

/// Offline cache parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a cached response stays valid.
    pub max_age_secs: f64,
    /// Maximum number of entries (requests + responses).
    pub max_size: usize,
    pub enable_offline_cache: bool,
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
    pub cache_successful_responses: bool,
    pub cache_failed_requests: bool,
    /// Seconds a queued request may wait before the stale sweep drops it.
    #[serde(default = "default_request_freshness_secs")]
    pub request_freshness_secs: f64,
}

fn default_request_freshness_secs() -> f64 {
    CachePolicy::default().max_request_age.as_secs_f64()
}

impl Default for CacheConfig {
    fn default() -> Self {
        let p = CachePolicy::default();
        Self {
            max_age_secs: p.max_age.as_secs_f64(),
            max_size: p.max_size,
            enable_offline_cache: p.enable_offline_cache,
            eviction_policy: p.eviction_policy,
            cache_successful_responses: p.cache_successful_responses,
            cache_failed_requests: p.cache_failed_requests,
            request_freshness_secs: p.max_request_age.as_secs_f64(),
        }
    }
}

impl CacheConfig {
    pub fn to_policy(&self) -> Result<CachePolicy, ConfigError> {
        let policy = CachePolicy {
            max_age: secs("cache.max_age_secs", self.max_age_secs)?,
            max_size: self.max_size,
            enable_offline_cache: self.enable_offline_cache,
            eviction_policy: self.eviction_policy,
            cache_successful_responses: self.cache_successful_responses,
            cache_failed_requests: self.cache_failed_requests,
            max_request_age: secs("cache.request_freshness_secs", self.request_freshness_secs)?,
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Where the offline cache lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile, process-local.
    Memory,
    /// SQLite database under the XDG state dir.
    #[default]
    Sqlite,
    /// JSON key-value file under the XDG state dir.
    File,
}

/// Global configuration loaded from `~/.config/redrive/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedriveConfig {
    /// Base URL that `send_message` paths are resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-attempt transport timeout in seconds.
    pub request_timeout_secs: u64,
    /// Seconds between background redrive passes.
    pub reprocess_interval_secs: u64,
    #[serde(default)]
    pub storage: StorageBackend,
    /// Static headers added to every request (e.g. `Authorization`).
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub auth_headers: std::collections::BTreeMap<String, String>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional cache policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

impl Default for RedriveConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: 30,
            reprocess_interval_secs: 30,
            storage: StorageBackend::Sqlite,
            auth_headers: Default::default(),
            retry: None,
            cache: None,
        }
    }
}

impl RedriveConfig {
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    pub fn cache_policy(&self) -> Result<CachePolicy, ConfigError> {
        self.cache.clone().unwrap_or_default().to_policy()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reprocess_interval(&self) -> Duration {
        Duration::from_secs(self.reprocess_interval_secs)
    }

    /// Check every constraint without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry_policy()?;
        self.cache_policy()?;
        if self.reprocess_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if let Some(base) = &self.base_url {
            url::Url::parse(base).map_err(|e| ConfigError::InvalidBaseUrl {
                url: base.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

fn secs(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidSeconds(field))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("redrive")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RedriveConfig> {
    load_or_init_at(&config_path()?)
}

/// Like [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<RedriveConfig> {
    if !path.exists() {
        let default_cfg = RedriveConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data =
        fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: RedriveConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(cfg)
}
