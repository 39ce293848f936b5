//! Classify transport failures and HTTP responses into error kinds.

use std::time::Duration;

use super::error::{RequestError, TransportFailure};
use super::kind::ErrorKind;
use crate::request::Response;

/// Longest body excerpt carried into an error message.
const BODY_EXCERPT_CHARS: usize = 200;

/// Classify a raw transport failure. Returns the kind and its intrinsic retryability.
pub fn classify(failure: &TransportFailure) -> (ErrorKind, bool) {
    let kind = match failure {
        TransportFailure::Curl(e) => classify_curl_error(e),
        TransportFailure::Connect(_) | TransportFailure::Cancelled => ErrorKind::Network,
        TransportFailure::TimedOut(_) => ErrorKind::Timeout,
        TransportFailure::Http { status, .. } => classify_status(*status),
        TransportFailure::Io(e) => classify_io_error(e),
        TransportFailure::InvalidArgument(_) | TransportFailure::Configuration(_) => {
            ErrorKind::Configuration
        }
        TransportFailure::Other(_) => ErrorKind::Unknown,
    };
    (kind, kind.default_retryable())
}

/// Classify an HTTP status code.
///
/// 408 is a deadline signature and wins over the generic 4xx rule.
pub fn classify_status(code: u16) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        500..=u16::MAX => ErrorKind::ServerError,
        429 => ErrorKind::RateLimited,
        401 | 403 => ErrorKind::Authentication,
        400..=499 => ErrorKind::ClientError,
        _ => ErrorKind::Unknown,
    }
}

/// Build a classified error straight from an already-received response.
pub fn classify_response(response: &Response) -> RequestError {
    let kind = classify_status(response.status);
    let excerpt: String = response.body.chars().take(BODY_EXCERPT_CHARS).collect();
    let message = if excerpt.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        format!("HTTP {}: {}", response.status, excerpt)
    };
    RequestError::new(kind, message)
        .with_status(response.status)
        .with_retry_after(retry_after_hint(
            response.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ))
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_ssl_connect_error()
        || e.is_aborted_by_callback()
    {
        return ErrorKind::Network;
    }
    if e.is_url_malformed() || e.is_unsupported_protocol() {
        return ErrorKind::Configuration;
    }
    ErrorKind::Unknown
}

fn classify_io_error(e: &std::io::Error) -> ErrorKind {
    use std::io::ErrorKind as Io;
    match e.kind() {
        Io::ConnectionRefused
        | Io::ConnectionReset
        | Io::ConnectionAborted
        | Io::NotConnected
        | Io::AddrNotAvailable
        | Io::BrokenPipe
        | Io::UnexpectedEof => ErrorKind::Network,
        Io::TimedOut | Io::WouldBlock => ErrorKind::Timeout,
        Io::InvalidInput | Io::InvalidData => ErrorKind::Configuration,
        _ => ErrorKind::Unknown,
    }
}

/// Parse a `Retry-After` header given in delta-seconds.
pub fn retry_after_hint<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<Duration> {
    headers
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

impl From<TransportFailure> for RequestError {
    fn from(failure: TransportFailure) -> Self {
        let (kind, _) = classify(&failure);
        match failure {
            TransportFailure::Cancelled => RequestError::cancelled(),
            TransportFailure::Http {
                status,
                ref headers,
                ..
            } => {
                let hint = retry_after_hint(headers.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                RequestError::new(kind, failure.to_string())
                    .with_status(status)
                    .with_retry_after(hint)
            }
            other => RequestError::new(kind, other.to_string()),
        }
    }
}
