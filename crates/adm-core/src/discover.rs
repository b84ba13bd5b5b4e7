//! Discovery pipeline: walk a group's messages, filter audio attachments,
//! deduplicate against the identifier cache, and submit new jobs to the
//! scheduler.

use anyhow::{Context, Result};

use crate::client::{GroupDescriptor, RemoteClient};
use crate::engine::DownloaderCtx;
use crate::media;
use crate::naming::{self, TemplateValues};
use crate::scheduler::JobSender;
use crate::store::{JobDefaults, JobRecord};

/// Knobs for one discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Maximum messages to walk, newest first.
    pub limit: usize,
    /// Template for target filenames; see `naming` for placeholders.
    pub filename_template: String,
}

/// What a discovery pass did, for logging and the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryStats {
    pub messages_scanned: u64,
    pub audio_seen: u64,
    pub submitted: u64,
    /// Skipped because the identifier cache already had the id.
    pub cache_hits: u64,
    /// Existing rows already in a terminal state.
    pub already_done: u64,
    /// New jobs whose file was already in the library (marked SKIPPED).
    pub pre_existing: u64,
}

/// Resolve `descriptor`, upsert the group, and submit every new audio job.
/// Existing non-terminal jobs are re-submitted so failed/resumable work is
/// retried on this sweep.
pub async fn discover_and_submit(
    ctx: &DownloaderCtx,
    descriptor: &GroupDescriptor,
    opts: &DiscoveryOptions,
    sender: &JobSender,
) -> Result<DiscoveryStats> {
    let group = ctx
        .client
        .resolve_group(descriptor)
        .await
        .with_context(|| format!("resolve group {descriptor:?}"))?;
    let group_row = ctx
        .store
        .upsert_group(group.id, &group.title, group.handle.as_deref())
        .await?;
    tracing::info!(
        group = group_row.remote_id,
        title = %group_row.title,
        "discovering up to {} messages",
        opts.limit
    );

    let messages = ctx
        .client
        .iter_messages(&group, opts.limit)
        .await
        .context("iterate group messages")?;

    let mut stats = DiscoveryStats::default();
    for msg in &messages {
        stats.messages_scanned += 1;
        let Some(att) = &msg.audio else { continue };
        if !media::is_audio_attachment(att) {
            continue;
        }
        stats.audio_seen += 1;

        let file_id = att.file.file_id;
        if ctx.cache.has(file_id) {
            stats.cache_hits += 1;
            continue;
        }

        // Existing row: terminal states feed the cache; everything else is
        // retried on this sweep.
        if let Some(job) = ctx.store.get_job_by_file_id(file_id).await? {
            if job.state.is_terminal() {
                ctx.cache.insert(file_id);
                stats.already_done += 1;
            } else {
                submit(sender, job, &mut stats)?;
            }
            continue;
        }

        let values = TemplateValues {
            title: att.title.clone(),
            performer: att.performer.clone(),
            album: None,
            year: None,
            track_number: None,
            counter: Some(stats.submitted + 1),
            date: Some(msg.date_unix.to_string()),
            file_id,
        };
        let extension = media::preferred_extension(att);
        let candidate = naming::derive_target_name(&opts.filename_template, &values, &extension);

        // A matching file already in the library: record it as SKIPPED
        // instead of renaming around it.
        let on_disk = tokio::fs::metadata(ctx.library_root.join(&candidate)).await;
        let pre_existing = on_disk
            .map(|m| m.is_file() && m.len() == att.declared_size)
            .unwrap_or(false)
            && !ctx.store.target_name_taken(&candidate).await?;

        let target_name = if pre_existing {
            candidate
        } else {
            resolve_collision(ctx, candidate).await?
        };

        let defaults = JobDefaults {
            remote_file_id: file_id,
            file_reference: att.file.reference.clone(),
            declared_size: att.declared_size as i64,
            mime_type: att.mime_type.clone(),
            duration_secs: att.duration_secs,
            title: att.title.clone(),
            performer: att.performer.clone(),
            target_name,
            group_ref: group_row.id,
        };
        let (job, created) = ctx.store.get_or_create_job(&defaults).await?;

        if !created {
            // Raced with another discovery; fall back to the existing-row
            // handling above.
            if job.state.is_terminal() {
                ctx.cache.insert(file_id);
                stats.already_done += 1;
            } else {
                submit(sender, job, &mut stats)?;
            }
            continue;
        }

        if pre_existing {
            ctx.store.mark_skipped(job.id, None).await?;
            ctx.cache.insert(file_id);
            stats.pre_existing += 1;
            tracing::debug!(
                file_id,
                target = %job.target_name,
                "already in library; marked skipped"
            );
            continue;
        }

        submit(sender, job, &mut stats)?;
    }

    tracing::info!(
        scanned = stats.messages_scanned,
        audio = stats.audio_seen,
        submitted = stats.submitted,
        cache_hits = stats.cache_hits,
        "discovery finished"
    );
    Ok(stats)
}

fn submit(sender: &JobSender, job: JobRecord, stats: &mut DiscoveryStats) -> Result<()> {
    anyhow::ensure!(sender.submit(job), "scheduler queue closed during discovery");
    stats.submitted += 1;
    Ok(())
}

/// Append `_N` until neither the store nor the filesystem claims the name.
async fn resolve_collision(ctx: &DownloaderCtx, candidate: String) -> Result<String> {
    if !name_taken(ctx, &candidate).await? {
        return Ok(candidate);
    }
    let (stem, ext) = match candidate.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s.to_string(), format!(".{e}")),
        _ => (candidate.clone(), String::new()),
    };
    let mut n = 1u32;
    loop {
        let next = format!("{stem}_{n}{ext}");
        if !name_taken(ctx, &next).await? {
            return Ok(next);
        }
        n += 1;
    }
}

async fn name_taken(ctx: &DownloaderCtx, name: &str) -> Result<bool> {
    if ctx.store.target_name_taken(name).await? {
        return Ok(true);
    }
    Ok(tokio::fs::metadata(ctx.library_root.join(name)).await.is_ok())
}
