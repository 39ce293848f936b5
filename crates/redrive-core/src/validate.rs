//! Request validation before anything goes on the wire.
//!
//! Validation failures are terminal: they are never retried and never
//! enqueued for redelivery.

use crate::request::Request;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("request url is empty")]
    EmptyUrl,
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),
    #[error("header {0:?} contains a line break")]
    InvalidHeaderValue(String),
    #[error("{0} request must not carry a body")]
    UnexpectedBody(crate::request::Method),
}

/// Checks a request before delivery.
pub trait Validator: Send + Sync {
    fn validate(&self, request: &Request) -> Result<(), ValidationError>;
}

/// Structural checks: absolute http(s) URL, well-formed headers, no body on GET/HEAD.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

impl Validator for BasicValidator {
    fn validate(&self, request: &Request) -> Result<(), ValidationError> {
        if request.url.trim().is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        let parsed = url::Url::parse(&request.url).map_err(|e| ValidationError::InvalidUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ValidationError::InvalidUrl {
                url: request.url.clone(),
                reason: "missing host".to_string(),
            });
        }

        for (name, value) in &request.headers {
            let valid_name = !name.is_empty()
                && name
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
            if !valid_name {
                return Err(ValidationError::InvalidHeaderName(name.clone()));
            }
            if value.contains('\r') || value.contains('\n') {
                return Err(ValidationError::InvalidHeaderValue(name.clone()));
            }
        }

        if request.body.is_some() && !request.method.allows_body() {
            return Err(ValidationError::UnexpectedBody(request.method));
        }
        Ok(())
    }
}

/// Accepts everything. Useful when the caller validates upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate(&self, _request: &Request) -> Result<(), ValidationError> {
        Ok(())
    }
}
