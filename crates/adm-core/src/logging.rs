//! Logging setup for the CLI and long-running downloads.
//!
//! Log lines go to `adm.log` in the XDG state directory, next to the job
//! database. When that file cannot be opened (read-only home, missing
//! $HOME in containers) the subscriber falls back to stderr so commands
//! still run with diagnostics.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,adm=debug"))
}

fn open_log_file() -> Result<(File, PathBuf)> {
    let path = xdg::BaseDirectories::with_prefix("adm")?
        .place_state_file("adm.log")
        .context("resolve log file path")?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    Ok((file, path))
}

/// Install the global subscriber. Filter defaults to `info,adm=debug` and
/// honours `RUST_LOG`. Call once, before any other work.
pub fn init() {
    match open_log_file() {
        Ok((file, path)) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
            tracing::info!("logging to {}", path.display());
        }
        Err(err) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .init();
            tracing::warn!("log file unavailable ({err:#}); logging to stderr");
        }
    }
}
