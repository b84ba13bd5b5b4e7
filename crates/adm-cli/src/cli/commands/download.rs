//! `adm download` – one invocation, one downloader lifecycle.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use adm_core::client::http::HttpRemoteClient;
use adm_core::client::GroupDescriptor;
use adm_core::config::AdmConfig;
use adm_core::discover::{self, DiscoveryOptions};
use adm_core::engine::DownloaderCtx;
use adm_core::maintenance;
use adm_core::scheduler;
use adm_core::store::JobStore;

pub async fn run_download(
    mut cfg: AdmConfig,
    group: &str,
    limit: usize,
    output: Option<PathBuf>,
    parallel: Option<usize>,
) -> Result<()> {
    if let Some(dir) = output {
        cfg.download_dir = dir;
    }
    if let Some(n) = parallel {
        let n = n.max(1);
        cfg.initial_concurrent_downloads = n;
        cfg.max_concurrent_downloads = cfg.max_concurrent_downloads.max(n);
    }
    cfg.validate_for_download()
        .context("configuration invalid for download")?;

    let descriptor = GroupDescriptor::parse(group)?;
    let client = Arc::new(HttpRemoteClient::from_config(&cfg)?);
    let store = JobStore::open_default().await?;

    tokio::fs::create_dir_all(&cfg.download_dir)
        .await
        .with_context(|| format!("create library root {}", cfg.download_dir.display()))?;

    let ctx = Arc::new(DownloaderCtx::new(
        &cfg,
        store.clone(),
        client,
        cfg.download_dir.clone(),
    ));

    let report = maintenance::run_startup(&ctx).await?;
    if report.recovered > 0 {
        println!("Recovered {} interrupted job(s); they will resume.", report.recovered);
    }
    ctx.seed_cache().await?;

    // Ctrl-C turns into a cooperative cancel: checkpoints are persisted
    // and partials kept for the next run.
    let control = Arc::clone(&ctx.control);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling; progress will be saved");
            control.cancel_all();
        }
    });

    let (sender, run) = scheduler::scheduler(Arc::clone(&ctx));
    let opts = DiscoveryOptions {
        limit,
        filename_template: cfg.filename_template.clone(),
    };
    let stats = discover::discover_and_submit(&ctx, &descriptor, &opts, &sender).await?;
    drop(sender);
    println!(
        "Discovered {} audio file(s); {} queued, {} already present.",
        stats.audio_seen,
        stats.submitted,
        stats.cache_hits + stats.already_done + stats.pre_existing
    );

    let summary = run.run().await?;
    println!("{summary}");

    let failed = store.list_failed().await?;
    if !failed.is_empty() {
        println!("Failed jobs:");
        for job in failed {
            println!(
                "  #{:<6} {:<40} attempts={} error={}",
                job.id,
                job.target_name,
                job.attempt_count,
                job.last_error.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}
