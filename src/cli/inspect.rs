//! Views of scheduler state
//!
//! Nothing here starts a backend or fires a job. Opening a backend recovers
//! its job store, which drops persisted rows that no longer decode or whose
//! schedule no longer validates.

use crate::server::build_context;
use crate::server::config::AppConfig;
use anyhow::{Context, Result};
use regquery_core::scheduler::{TaskStore, RECORD_STORE_FILE};

/// Print the jobs recovered from `backend`'s job store
pub async fn jobs(config: &AppConfig, backend: &str) -> Result<()> {
    let ctx = build_context(config).await?;
    let jobs = ctx.pool.list(backend).await?;

    if jobs.is_empty() {
        println!("No jobs scheduled on '{}'", backend);
    } else {
        println!("{:<38} {:<9} {:<27} {:<24} NAME", "ID", "KIND", "NEXT RUN", "HANDLER");
        for job in &jobs {
            println!(
                "{:<38} {:<9} {:<27} {:<24} {}",
                job.id,
                job.schedule_kind.as_str(),
                job.next_run_time.to_rfc3339(),
                job.handler,
                job.name
            );
        }
    }

    ctx.shutdown().await;
    Ok(())
}

/// Print recent execution records of `task_id`, newest first
pub async fn history(config: &AppConfig, task_id: &str, limit: i64) -> Result<()> {
    let store = TaskStore::from_path(&config.data_path().join(RECORD_STORE_FILE))
        .await
        .context("Failed to open record store")?;
    let records = store.list_executions(task_id, limit).await?;

    if records.is_empty() {
        println!("No executions recorded for '{}'", task_id);
    }
    for record in &records {
        let elapsed = record
            .end_time
            .map(|end| format!("{}ms", (end - record.start_time).num_milliseconds()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<8} {:>8}  {}",
            record.start_time.to_rfc3339(),
            record.status.as_str(),
            elapsed,
            record.error_message.as_deref().unwrap_or("")
        );
    }

    store.close().await;
    Ok(())
}
