use serde::{Deserialize, Serialize};
use std::fmt;

/// High-level classification of a delivery failure.
///
/// The set is closed: transports, the classifier and the validator all map
/// their failures into one of these kinds, and the retry policy decides per
/// kind whether another attempt is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused/reset, DNS failure, socket-level errors.
    Network,
    /// Connect or transfer deadline exceeded.
    Timeout,
    /// HTTP 5xx.
    ServerError,
    /// HTTP 429.
    RateLimited,
    /// HTTP 401 / 403.
    Authentication,
    /// Request rejected locally before it was sent.
    Validation,
    /// Any other HTTP 4xx.
    ClientError,
    /// The offline cache itself failed.
    CacheError,
    /// Bad local arguments, state or configuration.
    Configuration,
    /// Anything that did not match a more specific rule.
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::ServerError,
        ErrorKind::RateLimited,
        ErrorKind::Authentication,
        ErrorKind::Validation,
        ErrorKind::ClientError,
        ErrorKind::CacheError,
        ErrorKind::Configuration,
        ErrorKind::Unknown,
    ];

    /// Intrinsic retryability of the kind, before any policy override.
    pub fn default_retryable(self) -> bool {
        match self {
            ErrorKind::Network
            | ErrorKind::Timeout
            | ErrorKind::ServerError
            | ErrorKind::RateLimited
            | ErrorKind::Unknown => true,
            ErrorKind::Authentication
            | ErrorKind::ClientError
            | ErrorKind::CacheError
            | ErrorKind::Validation
            | ErrorKind::Configuration => false,
        }
    }

    /// Kinds no policy may ever retry or enqueue.
    pub fn is_always_terminal(self) -> bool {
        matches!(self, ErrorKind::Validation | ErrorKind::Configuration)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "server_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Validation => "validation",
            ErrorKind::ClientError => "client_error",
            ErrorKind::CacheError => "cache_error",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
