//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check_link;
mod clean;
mod init;
mod update;
mod view;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::load_settings;
use crate::work_queue::BULK_QUEUE;

#[derive(Parser)]
#[command(name = "archiver")]
#[command(about = "Archive dataset resources and track link health")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Create the archive directory and database tables
    Init,

    /// Archive resources. IDs may be dataset ids, dataset names or resource
    /// ids; with none, every dataset in the catalog is archived.
    Update {
        ids: Vec<String>,
        /// Queue name recorded on events
        #[arg(short, long, default_value = BULK_QUEUE)]
        queue: String,
        /// Number of jobs run at once
        #[arg(short, long, default_value = "4")]
        workers: usize,
    },

    /// Show archival status for a dataset, or ledger totals
    View {
        /// Dataset id or name
        dataset: Option<String>,
    },

    /// Delete every archival record
    CleanStatus {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Forget cached content locations (files on disk are left alone)
    CleanCached {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Histogram of archived file sizes
    SizeReport,

    /// Send a HEAD request to a URL and print the result
    CheckLink { url: String },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (settings, _config) = load_settings(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Update {
            ids,
            queue,
            workers,
        } => update::cmd_update(&settings, &ids, &queue, workers).await,
        Commands::View { dataset } => view::cmd_view(&settings, dataset.as_deref()).await,
        Commands::CleanStatus { yes } => clean::cmd_clean_status(&settings, yes).await,
        Commands::CleanCached { yes } => clean::cmd_clean_cached(&settings, yes).await,
        Commands::SizeReport => clean::cmd_size_report(&settings).await,
        Commands::CheckLink { url } => check_link::cmd_check_link(&settings, &url).await,
    }
}
