//! Failure types at the transport boundary and after classification.

use std::time::Duration;

use super::kind::ErrorKind;

/// Raw failure reported by a transport, before classification.
///
/// Transports return this instead of a string so the classifier never has
/// to sniff error messages.
#[derive(Debug, thiserror::Error)]
pub enum TransportFailure {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connect(String),
    /// A deadline elapsed before the exchange completed.
    #[error("timed out: {0}")]
    TimedOut(String),
    /// The transport treated a received non-2xx response as a failure.
    #[error("HTTP {status}")]
    Http {
        status: u16,
        body: String,
        headers: Vec<(String, String)>,
    },
    /// Local socket or file error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The request could not be expressed by the transport (bad method, bad URL).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The transport itself is misconfigured.
    #[error("configuration: {0}")]
    Configuration(String),
    /// The exchange was aborted by `Transport::cancel_all`.
    #[error("transfer cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// A classified delivery failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RequestError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status when the failure came from a received response.
    pub status: Option<u16>,
    /// Server-provided `Retry-After` hint.
    pub retry_after: Option<Duration>,
    cancelled: bool,
}

impl RequestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
            cancelled: false,
        }
    }

    /// Terminal error produced when a cancellation signal interrupts delivery.
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::new(ErrorKind::Network, "operation cancelled")
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, hint: Option<Duration>) -> Self {
        self.retry_after = hint;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl From<crate::validate::ValidationError> for RequestError {
    fn from(e: crate::validate::ValidationError) -> Self {
        RequestError::new(ErrorKind::Validation, e.to_string())
    }
}

impl From<crate::cache::CacheError> for RequestError {
    fn from(e: crate::cache::CacheError) -> Self {
        RequestError::new(ErrorKind::CacheError, e.to_string())
    }
}

impl From<crate::config::ConfigError> for RequestError {
    fn from(e: crate::config::ConfigError) -> Self {
        RequestError::new(ErrorKind::Configuration, e.to_string())
    }
}
