//! CLI for the ADM audio download manager.

mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use adm_core::config;
use adm_core::store::JobStore;

use commands::{run_download, run_groups, run_performance, run_search, run_stats};

/// Top-level CLI for the ADM audio download manager.
#[derive(Debug, Parser)]
#[command(name = "adm")]
#[command(about = "ADM: resumable audio download manager for chat channels", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download audio from a group: numeric id, @handle, or t.me link.
    Download {
        /// Group descriptor.
        group: String,
        /// Walk at most N messages, newest first.
        #[arg(long, default_value = "1000", value_name = "N")]
        limit: usize,
        /// Library root (default: download_dir from the config file).
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Start with N parallel downloads (the governor adapts from there).
        #[arg(long, value_name = "N")]
        parallel: Option<usize>,
    },

    /// Search stored jobs by title, performer, or filename. Read-only.
    Search {
        /// Case-insensitive substring.
        query: String,
    },

    /// Show aggregate job counts and byte totals. Read-only.
    Stats,

    /// List discovered groups with per-group progress. Read-only.
    Groups,

    /// Show throughput/attempt figures and recent failures. Read-only.
    Performance,

    /// Emit shell completions to stdout.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Download {
                group,
                limit,
                output,
                parallel,
            } => {
                run_download(cfg, &group, limit, output, parallel).await?;
            }
            CliCommand::Search { query } => {
                let db = JobStore::open_default().await?;
                run_search(&db, &query).await?;
            }
            CliCommand::Stats => {
                let db = JobStore::open_default().await?;
                run_stats(&db).await?;
            }
            CliCommand::Groups => {
                let db = JobStore::open_default().await?;
                run_groups(&db).await?;
            }
            CliCommand::Performance => {
                let db = JobStore::open_default().await?;
                run_performance(&db).await?;
            }
            CliCommand::Completions { shell } => {
                let mut cmd = Cli::command();
                let name = cmd.get_name().to_string();
                clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
