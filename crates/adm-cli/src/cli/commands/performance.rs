//! `adm performance` – attempt/failure figures from the job store.

use anyhow::Result;
use adm_core::store::JobStore;

pub async fn run_performance(db: &JobStore) -> Result<()> {
    let stats = db.stats().await?;
    println!(
        "Completed: {} job(s), {:.1} MiB, {:.2} attempts/job on average",
        stats.counts.completed,
        stats.completed_bytes as f64 / (1024.0 * 1024.0),
        stats.avg_attempts_completed
    );

    let failed = db.list_failed().await?;
    println!("Failed: {} job(s)", failed.len());
    for job in failed.iter().take(20) {
        println!(
            "  #{:<6} attempts={:<3} {:<40} {}",
            job.id,
            job.attempt_count,
            job.target_name,
            job.last_error.as_deref().unwrap_or("-")
        );
    }
    if failed.len() > 20 {
        println!("  ... and {} more", failed.len() - 20);
    }
    Ok(())
}
