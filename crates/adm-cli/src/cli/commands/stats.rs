//! `adm stats` – aggregate counts over the job store.

use anyhow::Result;
use adm_core::store::JobStore;

pub async fn run_stats(db: &JobStore) -> Result<()> {
    let stats = db.stats().await?;
    let c = stats.counts;
    println!("Jobs: {} total", c.total());
    println!("  pending     {}", c.pending);
    println!("  downloading {}", c.downloading);
    println!("  completed   {}", c.completed);
    println!("  failed      {}", c.failed);
    println!("  skipped     {}", c.skipped);
    println!(
        "Library: {:.1} MiB across completed files",
        stats.completed_bytes as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}
