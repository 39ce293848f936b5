//! `redrive daemon` – periodic redelivery until Ctrl-C.

use anyhow::{Context, Result};
use redrive_core::RequestOrchestrator;
use std::time::Duration;

pub async fn run_daemon(orchestrator: &RequestOrchestrator, interval: Option<u64>) -> Result<()> {
    if let Some(secs) = interval {
        orchestrator.set_reprocess_interval(Duration::from_secs(secs))?;
    }
    // Drain whatever is already queued before the first tick.
    match orchestrator.process_cached_requests().await {
        Ok(report) if report.attempted > 0 => {
            println!(
                "Redelivered {} of {} queued request(s).",
                report.delivered, report.attempted
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("initial redrive pass failed: {}", e),
    }

    orchestrator.start_background()?;
    println!("Redelivering queued requests in the background; Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    println!("Stopping.");
    orchestrator.dispose().await;
    Ok(())
}
