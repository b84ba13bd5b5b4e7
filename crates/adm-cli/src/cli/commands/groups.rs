//! `adm groups` – discovered groups and their per-group progress.

use anyhow::Result;
use adm_core::store::JobStore;

pub async fn run_groups(db: &JobStore) -> Result<()> {
    let groups = db.list_groups().await?;
    if groups.is_empty() {
        println!("No groups discovered yet.");
        return Ok(());
    }
    println!("{:<14} {:<20} {:<10} {}", "REMOTE ID", "HANDLE", "DONE", "TITLE");
    for g in groups {
        println!(
            "{:<14} {:<20} {:<10} {}",
            g.group.remote_id,
            g.group.handle.as_deref().unwrap_or("-"),
            format!("{}/{}", g.completed_jobs, g.total_jobs),
            g.group.title
        );
    }
    Ok(())
}
