//! Payload handlers registered by the server
//!
//! The request logging interceptor submits one-off `date` jobs keyed
//! [`LOG_REQUEST`]; the catalog prunes old audit files daily with
//! [`PRUNE_LOGS`].

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use regquery_core::scheduler::{HandlerInput, HandlerRegistry, TaskHandler};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Appends one request audit line
pub const LOG_REQUEST: &str = "audit.log_request";
/// Deletes audit files past their age limit
pub const PRUNE_LOGS: &str = "audit.prune_logs";

const DEFAULT_MAX_AGE_DAYS: u64 = 90;

/// Daily JSON-lines audit files under one directory
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("requests-{}.jsonl", date.format("%Y-%m-%d")))
    }

    fn date_of(path: &Path) -> Option<NaiveDate> {
        let name = path.file_name()?.to_str()?;
        let date = name.strip_prefix("requests-")?.strip_suffix(".jsonl")?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }
}

struct LogRequestHandler {
    audit: Arc<AuditLog>,
}

#[async_trait]
impl TaskHandler for LogRequestHandler {
    async fn call(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let now = Utc::now();
        let path = self.audit.file_for(now.date_naive());
        tokio::fs::create_dir_all(&self.audit.dir)
            .await
            .with_context(|| format!("creating {}", self.audit.dir.display()))?;

        let mut line = serde_json::to_vec(&json!({
            "logged_at": now,
            "task_id": input.task_id,
            "args": input.args,
            "request": input.details,
        }))?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(json!({ "file": path.display().to_string(), "bytes": line.len() }))
    }
}

struct PruneLogsHandler {
    audit: Arc<AuditLog>,
}

#[async_trait]
impl TaskHandler for PruneLogsHandler {
    async fn call(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let max_age_days = input
            .detail_u64("max_age_days")
            .unwrap_or(DEFAULT_MAX_AGE_DAYS);
        let cutoff = Utc::now().date_naive() - Duration::days(max_age_days as i64);

        let mut entries = match tokio::fs::read_dir(&self.audit.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(json!({ "removed": 0 }));
            }
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0u64;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match AuditLog::date_of(&path) {
                Some(date) if date < cutoff => {
                    tokio::fs::remove_file(&path)
                        .await
                        .with_context(|| format!("removing {}", path.display()))?;
                    debug!(file = %path.display(), "Pruned audit file");
                    removed += 1;
                }
                _ => {}
            }
        }

        Ok(json!({ "removed": removed }))
    }
}

/// Register the server's payload handlers
pub fn register(handlers: &mut HandlerRegistry, data_dir: &Path) {
    let audit = Arc::new(AuditLog::new(data_dir.join("audit")));
    handlers
        .register(
            LOG_REQUEST,
            Arc::new(LogRequestHandler {
                audit: audit.clone(),
            }),
        )
        .register(PRUNE_LOGS, Arc::new(PruneLogsHandler { audit }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use regquery_core::scheduler::Payload;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> HandlerRegistry {
        let mut handlers = HandlerRegistry::new();
        register(&mut handlers, dir.path());
        handlers
    }

    #[tokio::test]
    async fn test_log_request_appends_lines() {
        let dir = TempDir::new().unwrap();
        let handlers = registry(&dir);
        let payload = Payload::new(LOG_REQUEST)
            .with_detail("method", "GET")
            .with_detail("path", "/v1/companies/123");

        let handler = handlers.resolve(LOG_REQUEST).unwrap();
        handler.call(HandlerInput::new("req-1", &payload)).await.unwrap();
        handler.call(HandlerInput::new("req-2", &payload)).await.unwrap();

        let audit = AuditLog::new(dir.path().join("audit"));
        let content =
            std::fs::read_to_string(audit.file_for(Utc::now().date_naive())).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["task_id"], json!("req-1"));
        assert_eq!(lines[1]["request"]["path"], json!("/v1/companies/123"));
    }

    #[tokio::test]
    async fn test_prune_removes_only_old_files() {
        let dir = TempDir::new().unwrap();
        let handlers = registry(&dir);
        let audit_dir = dir.path().join("audit");
        std::fs::create_dir_all(&audit_dir).unwrap();

        let audit = AuditLog::new(&audit_dir);
        let today = Utc::now().date_naive();
        let old = audit.file_for(today - Duration::days(40));
        let recent = audit.file_for(today - Duration::days(2));
        let unrelated = audit_dir.join("notes.txt");
        for path in [&old, &recent, &unrelated] {
            std::fs::write(path, "{}\n").unwrap();
        }

        let payload = Payload::new(PRUNE_LOGS).with_detail("max_age_days", 30);
        let result = handlers
            .resolve(PRUNE_LOGS)
            .unwrap()
            .call(HandlerInput::new("prune", &payload))
            .await
            .unwrap();

        assert_eq!(result, json!({ "removed": 1 }));
        assert!(!old.exists());
        assert!(recent.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn test_prune_without_directory() {
        let dir = TempDir::new().unwrap();
        let handlers = registry(&dir);
        let payload = Payload::new(PRUNE_LOGS);
        let result = handlers
            .resolve(PRUNE_LOGS)
            .unwrap()
            .call(HandlerInput::new("prune", &payload))
            .await
            .unwrap();
        assert_eq!(result, json!({ "removed": 0 }));
    }
}
