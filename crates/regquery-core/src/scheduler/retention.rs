//! Built-in retention sweep for execution records
//!
//! Registered under [`RETENTION_HANDLER`]; payload details may override the
//! configured `max_age_days` and `max_rows` per descriptor.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::handlers::{HandlerInput, TaskHandler};
use super::store::TaskStore;
use super::types::Result;

/// Handler key of the retention sweep
pub const RETENTION_HANDLER: &str = "scheduler.retention";

/// Limits applied by a sweep; `None` disables that rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Delete records inserted more than this many days ago
    pub max_age_days: Option<u64>,
    /// Keep at most this many of the newest records
    pub max_rows: Option<u64>,
}

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    /// Removed for age
    pub expired: u64,
    /// Removed by the row cap
    pub trimmed: u64,
}

/// Deletes old execution records
pub struct RetentionHandler {
    store: Arc<TaskStore>,
    policy: RetentionPolicy,
}

impl RetentionHandler {
    /// Create a sweep over `store` with default limits
    pub fn new(store: Arc<TaskStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Apply `policy` once
    pub async fn sweep(&self, policy: RetentionPolicy) -> Result<SweepOutcome> {
        let mut outcome = SweepOutcome::default();

        if let Some(days) = policy.max_age_days {
            match age_cutoff(days) {
                Some(cutoff) => {
                    outcome.expired = self.store.delete_executions_before(cutoff).await?;
                }
                None => debug!(max_age_days = days, "Age limit out of range, no age cutoff"),
            }
        }
        if let Some(rows) = policy.max_rows {
            outcome.trimmed = self
                .store
                .trim_executions(rows.min(i64::MAX as u64) as i64)
                .await?;
        }

        info!(
            expired = outcome.expired,
            trimmed = outcome.trimmed,
            "Retention sweep finished"
        );
        Ok(outcome)
    }
}

fn age_cutoff(days: u64) -> Option<DateTime<Utc>> {
    let age = Duration::try_days(i64::try_from(days).ok()?)?;
    Utc::now().checked_sub_signed(age)
}

#[async_trait]
impl TaskHandler for RetentionHandler {
    async fn call(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let policy = RetentionPolicy {
            max_age_days: input.detail_u64("max_age_days").or(self.policy.max_age_days),
            max_rows: input.detail_u64("max_rows").or(self.policy.max_rows),
        };
        let outcome = self.sweep(policy).await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::{Payload, ScheduleKind, TaskDescriptor, TaskExecutionRecord};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_details_override_policy() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            TaskStore::from_path(&dir.path().join("tasks.db"))
                .await
                .unwrap(),
        );
        let task = TaskDescriptor::new(
            "audit",
            ScheduleKind::Interval,
            json!({"minutes": 1}).as_object().cloned().unwrap(),
            Payload::new("log_request"),
        );

        let mut conn = store.acquire().await.unwrap();
        for age_days in [40, 20, 1] {
            let mut record = TaskExecutionRecord::start(&task);
            record.inserted_at = Utc::now() - Duration::days(age_days);
            TaskStore::insert_execution(&mut conn, &record).await.unwrap();
        }
        drop(conn);

        let handler = RetentionHandler::new(
            store.clone(),
            RetentionPolicy {
                max_age_days: Some(30),
                max_rows: None,
            },
        );
        let payload = Payload::new(RETENTION_HANDLER).with_detail("max_age_days", 10);
        let result = handler
            .call(HandlerInput::new("retention", &payload))
            .await
            .unwrap();

        assert_eq!(result, json!({"expired": 2, "trimmed": 0}));
        assert_eq!(store.count_executions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_age_expires_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            TaskStore::from_path(&dir.path().join("tasks.db"))
                .await
                .unwrap(),
        );
        let task = TaskDescriptor::new(
            "audit",
            ScheduleKind::Interval,
            json!({"minutes": 1}).as_object().cloned().unwrap(),
            Payload::new("log_request"),
        );
        let mut conn = store.acquire().await.unwrap();
        let mut record = TaskExecutionRecord::start(&task);
        record.inserted_at = Utc::now() - Duration::days(400);
        TaskStore::insert_execution(&mut conn, &record).await.unwrap();
        drop(conn);

        let handler = RetentionHandler::new(store.clone(), RetentionPolicy::default());
        for days in [u64::MAX, i64::MAX as u64, 100_000_000_000] {
            let outcome = handler
                .sweep(RetentionPolicy {
                    max_age_days: Some(days),
                    max_rows: None,
                })
                .await
                .unwrap();
            assert_eq!(outcome, SweepOutcome::default());
        }
        assert_eq!(store.count_executions().await.unwrap(), 1);
    }
}
