//! `adm search` – read-only lookup over stored jobs.

use anyhow::Result;
use adm_core::store::JobStore;

pub async fn run_search(db: &JobStore, query: &str) -> Result<()> {
    let jobs = db.search_jobs(query).await?;
    if jobs.is_empty() {
        println!("No jobs match '{query}'.");
        return Ok(());
    }
    println!(
        "{:<6} {:<12} {:<12} {:<30} {}",
        "ID", "STATE", "SIZE", "PERFORMER", "TARGET"
    );
    for j in jobs {
        println!(
            "{:<6} {:<12} {:<12} {:<30} {}",
            j.id,
            j.state.as_str(),
            j.declared_size,
            j.performer.as_deref().unwrap_or("-"),
            j.target_name
        );
    }
    Ok(())
}
