//! `redrive stats` – cache statistics.

use anyhow::Result;
use redrive_core::cache::CacheManager;

pub async fn run_stats(cache: &CacheManager, json: bool) -> Result<()> {
    let export = cache.get_statistics().await?.export();
    if json {
        println!("{}", serde_json::to_string_pretty(&export)?);
        return Ok(());
    }
    println!("entries:      {} / {}", export.total_entries, export.max_capacity);
    println!("queued:       {}", export.cached_requests);
    println!("responses:    {}", export.cached_responses);
    println!("utilization:  {:.1}%", export.utilization_percentage);
    Ok(())
}
