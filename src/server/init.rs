//! Server run loop

use super::background_tasks::start_scheduler;
use super::config::AppConfig;
use anyhow::Result;
use tracing::info;

/// Run until Ctrl-C
pub async fn run(config: AppConfig) -> Result<()> {
    info!("Starting regquery v{}", env!("CARGO_PKG_VERSION"));

    let scheduler = start_scheduler(&config).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Some(ctx) = scheduler {
        ctx.shutdown().await;
    }

    info!("regquery stopped");
    Ok(())
}
