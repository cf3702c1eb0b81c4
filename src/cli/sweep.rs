use crate::server::config::AppConfig;
use anyhow::{Context, Result};
use regquery_core::scheduler::{RetentionHandler, TaskStore, RECORD_STORE_FILE};
use std::sync::Arc;

/// Apply the configured retention policy once
pub async fn run(config: &AppConfig) -> Result<()> {
    let store = Arc::new(
        TaskStore::from_path(&config.data_path().join(RECORD_STORE_FILE))
            .await
            .context("Failed to open record store")?,
    );
    let policy = config.retention.policy();
    let outcome = RetentionHandler::new(store.clone(), policy)
        .sweep(policy)
        .await?;

    println!(
        "Removed {} expired and {} over-cap execution records",
        outcome.expired, outcome.trimmed
    );
    store.close().await;
    Ok(())
}
