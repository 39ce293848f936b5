//! `redrive process` – one manual redelivery pass.

use anyhow::Result;
use redrive_core::RequestOrchestrator;

pub async fn run_process(orchestrator: &RequestOrchestrator) -> Result<()> {
    let report = orchestrator.process_cached_requests().await?;
    println!(
        "Redelivered {} of {} queued request(s); {} still failing, {} stale dropped.",
        report.delivered, report.attempted, report.failed, report.stale_removed
    );
    Ok(())
}
