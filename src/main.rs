//! Regquery - background task scheduler
//!
//! CLI entry point for the registry query service scheduler.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    init_tracing(json_logging());

    cli::run(cli).await
}

/// `logging.json` is read ahead of the full config so the subscriber is up
/// before anything else logs
fn json_logging() -> bool {
    server::load_config()
        .map(|config| config.logging.json)
        .unwrap_or(false)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "regquery=info,regquery_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
