//! `redrive send <url>` – deliver one request.

use anyhow::{anyhow, Context, Result};
use redrive_core::{Delivery, Method, Request, RequestOrchestrator};

#[derive(Debug, Clone)]
pub struct SendArgs {
    pub url: String,
    pub method: String,
    pub data: Option<String>,
    pub headers: Vec<String>,
    pub cache_key: Option<String>,
}

/// Split a `Name: value` header argument.
pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("header must look like `Name: value`, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("header name is empty in {raw:?}");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub(crate) fn print_delivery(delivery: &Delivery) {
    match delivery {
        Delivery::Sent(response) => {
            println!("HTTP {}", response.status);
            if !response.body.is_empty() {
                println!("{}", response.body);
            }
        }
        Delivery::Queued { id, error } => {
            println!("Queued {id} for redelivery ({error})");
        }
    }
}

pub async fn run_send(orchestrator: &RequestOrchestrator, args: SendArgs) -> Result<()> {
    let method: Method = args.method.parse().map_err(|e: String| anyhow!(e))?;
    let mut request = Request::new(method, args.url);
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(name, value);
    }
    if let Some(body) = args.data {
        request = request.with_body(body);
    }
    if let Some(key) = args.cache_key {
        request = request.with_cache_key(key);
    }

    let delivery = orchestrator
        .send_request(request)
        .await
        .context("request failed")?;
    print_delivery(&delivery);
    Ok(())
}
