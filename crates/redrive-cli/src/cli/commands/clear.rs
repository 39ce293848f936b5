//! `redrive clear` – empty the cache.

use anyhow::Result;
use redrive_core::cache::CacheManager;

pub async fn run_clear(cache: &CacheManager) -> Result<()> {
    let before = cache.get_statistics().await?.total_entries;
    cache.clear().await?;
    println!("Removed {before} cache entr{}", if before == 1 { "y" } else { "ies" });
    Ok(())
}
