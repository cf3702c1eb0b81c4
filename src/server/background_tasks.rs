//! Scheduler startup
//!
//! Builds the scheduler context, reconciles the static catalog and starts
//! every backend.

use super::config::AppConfig;
use super::handlers;
use anyhow::{Context, Result};
use regquery_core::scheduler::{HandlerRegistry, SchedulerContext};
use tracing::info;

/// Build the scheduler context without starting it
pub async fn build_context(config: &AppConfig) -> Result<SchedulerContext> {
    let mut registry = HandlerRegistry::new();
    handlers::register(&mut registry, &config.data_path());

    SchedulerContext::init(
        &config.scheduler_config(),
        registry,
        config.retention.policy(),
    )
    .await
    .context("Failed to initialize scheduler")
}

/// Start the scheduler and bootstrap the catalog
pub async fn start_scheduler(config: &AppConfig) -> Result<Option<SchedulerContext>> {
    if !config.scheduler.enabled {
        info!("Scheduler disabled by configuration");
        return Ok(None);
    }

    let catalog = config.catalog().context("Invalid task catalog")?;
    let ctx = build_context(config).await?;

    ctx.start().await.context("Failed to start scheduler")?;
    let report = ctx
        .bootstrap(catalog)
        .await
        .context("Failed to bootstrap task catalog")?;

    info!(
        "Scheduler started (backends: {}, max concurrent: {}, scheduled: {}, restored: {}, updated: {}, inactive: {})",
        ctx.pool.backend_names().join(", "),
        config.scheduler.max_concurrent,
        report.scheduled.len(),
        report.restored.len(),
        report.updated.len(),
        report.inactive.len()
    );

    Ok(Some(ctx))
}
