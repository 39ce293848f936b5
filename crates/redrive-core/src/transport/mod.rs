//! Delivery of a single request over the wire.
//!
//! A transport makes exactly one attempt. Retries, classification and
//! caching happen above it, in the orchestrator.

mod libcurl;
mod parse;

pub use libcurl::CurlTransport;

use async_trait::async_trait;

use crate::request::{Request, Response};
use crate::retry::TransportFailure;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange. Any received HTTP response is `Ok`, whatever
    /// its status; `Err` means no response was obtained.
    async fn send(&self, request: &Request) -> Result<Response, TransportFailure>;

    /// Abort exchanges that are currently in flight.
    fn cancel_all(&self) {}
}
