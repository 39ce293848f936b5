//! `redrive message <path> <json>` – POST JSON under the configured base URL.

use anyhow::{Context, Result};
use redrive_core::RequestOrchestrator;

use super::print_delivery;

pub async fn run_message(orchestrator: &RequestOrchestrator, path: &str, json: &str) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(json).context("message payload is not valid JSON")?;
    let delivery = orchestrator
        .send_message(path, &payload)
        .await
        .context("message failed")?;
    print_delivery(&delivery);
    Ok(())
}
