//! libcurl transport.
//!
//! Each send runs one blocking `Easy` transfer on the tokio blocking pool.
//! `cancel_all` bumps a generation counter; the progress callback of every
//! transfer started under an older generation aborts it.

use async_trait::async_trait;
use std::str;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::parse::parse_header_lines;
use super::Transport;
use crate::request::{Method, Request, Response};
use crate::retry::TransportFailure;

#[derive(Debug, Clone)]
pub struct CurlTransport {
    timeout: Duration,
    connect_timeout: Duration,
    generation: Arc<AtomicU64>,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl CurlTransport {
    /// Transport with a whole-exchange `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            connect_timeout: timeout.min(Duration::from_secs(15)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn perform(&self, request: &Request, started: u64) -> Result<Response, TransportFailure> {
        let mut easy = curl::easy::Easy::new();
        easy.url(&request.url)?;
        easy.follow_location(true)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(self.timeout)?;

        match request.method {
            Method::Get => easy.get(true)?,
            Method::Head => easy.nobody(true)?,
            Method::Post => easy.post(true)?,
            Method::Put | Method::Patch | Method::Delete => {
                easy.custom_request(request.method.as_str())?
            }
        }
        if request.method.allows_body() {
            match &request.body {
                Some(body) => easy.post_fields_copy(body.as_bytes())?,
                None if request.method == Method::Post => easy.post_fields_copy(&[])?,
                None => {}
            }
        }

        let mut list = curl::easy::List::new();
        for (k, v) in &request.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        if !request.headers.is_empty() {
            easy.http_headers(list)?;
        }
        easy.progress(true)?;

        let mut body = Vec::new();
        let mut header_lines: Vec<String> = Vec::new();
        {
            let generation = Arc::clone(&self.generation);
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    header_lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            // Returning false aborts the transfer.
            transfer.progress_function(move |_, _, _, _| {
                generation.load(Ordering::SeqCst) == started
            })?;
            if let Err(e) = transfer.perform() {
                if e.is_aborted_by_callback() {
                    return Err(TransportFailure::Cancelled);
                }
                if e.is_operation_timedout() {
                    return Err(TransportFailure::TimedOut(e.to_string()));
                }
                return Err(TransportFailure::Curl(e));
            }
        }

        let status = easy.response_code()?;
        let status = u16::try_from(status)
            .map_err(|_| TransportFailure::Other(format!("invalid status code {status}")))?;
        Ok(Response {
            status,
            headers: parse_header_lines(&header_lines),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[async_trait]
impl Transport for CurlTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportFailure> {
        let started = self.generation.load(Ordering::SeqCst);
        let this = self.clone();
        let request = request.clone();
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        tokio::task::spawn_blocking(move || this.perform(&request, started))
            .await
            .map_err(|e| TransportFailure::Other(format!("transfer task failed: {e}")))?
    }

    fn cancel_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
