//! CLI module for regquery
//!
//! Provides commands:
//! - `run`: Start the scheduler (default)
//! - `jobs`: List live jobs of a backend
//! - `history`: Show recent executions of a task
//! - `sweep`: Apply execution record retention once

use clap::{Parser, Subcommand};
use regquery_core::scheduler::BACKGROUND;

pub mod inspect;
pub mod sweep;

/// Registry query service task scheduler
#[derive(Parser, Debug)]
#[command(name = "regquery")]
#[command(about = "Background task scheduler for the registry query service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the scheduler and run until Ctrl-C (default)
    Run,
    /// List jobs recovered from a backend's job store (drops rows that no longer decode)
    Jobs {
        /// Backend name
        #[arg(long, default_value = BACKGROUND)]
        backend: String,
    },
    /// Show recent execution records of a task
    History {
        /// Descriptor id
        task_id: String,
        /// Maximum records to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Apply execution record retention once
    Sweep,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = crate::server::load_config()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => crate::server::run(config).await,
        Commands::Jobs { backend } => inspect::jobs(&config, &backend).await,
        Commands::History { task_id, limit } => inspect::history(&config, &task_id, limit).await,
        Commands::Sweep => sweep::run(&config).await,
    }
}
