//! `redrive queue` – list requests waiting for redelivery.

use anyhow::Result;
use redrive_core::cache::CacheManager;

pub async fn run_queue(cache: &CacheManager) -> Result<()> {
    let queued = cache.get_cached_requests().await?;
    if queued.is_empty() {
        println!("No queued requests.");
        return Ok(());
    }
    println!("{:<38} {:<8} {:<7} {}", "ID", "RETRIES", "METHOD", "URL");
    for r in queued {
        println!(
            "{:<38} {:<8} {:<7} {}",
            r.id, r.retry_count, r.request.method, r.request.url
        );
        if let Some(err) = &r.last_error {
            println!("  last error: {err}");
        }
    }
    Ok(())
}
