mod commands;
mod render;
mod utils;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use calsync_core::SyncConfig;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "calsync")]
#[command(about = "Mirror a Teams ICS calendar into a Google calendar")]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/calsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the Google calendar with the Teams feed
    Sync {
        /// Compute and print the operations without applying them
        #[arg(long)]
        dry_run: bool,

        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show what a sync would change
    Status {
        /// List every operation even when there are many
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the current sync window
    Window,
    /// Delete every Google event in the current window
    Purge {
        /// Required, since this deletes events that the feed still has
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration with credentials hidden
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref())?;
    utils::logging::init(&config.log_level);

    match cli.command {
        Commands::Sync { dry_run, json } => {
            let runner = commands::connect(&config)?;
            commands::sync::run(&runner, dry_run, json).await
        }
        Commands::Status { verbose } => {
            let runner = commands::connect(&config)?;
            commands::status::run(&runner, verbose).await
        }
        Commands::Window => commands::window::run(&config),
        Commands::Purge { force } => {
            if !force {
                anyhow::bail!(
                    "Refusing to purge without --force.\n\
                    This deletes every Google event in the sync window, including ones the feed still has."
                );
            }
            let runner = commands::connect(&config)?;
            commands::purge::run(&runner).await
        }
        Commands::Config => commands::config::run(cli.config.as_deref(), &config),
    }
}
