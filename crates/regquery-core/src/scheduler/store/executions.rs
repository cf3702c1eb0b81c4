use super::TaskStore;
use crate::scheduler::types::{ExecutionRow, ExecutionStatus, Result, TaskExecutionRecord};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

impl TaskStore {
    /// Insert a freshly started execution record on `conn`
    pub async fn insert_execution(
        conn: &mut SqliteConnection,
        record: &TaskExecutionRecord,
    ) -> Result<()> {
        let details = serde_json::to_string(&record.details)?;

        sqlx::query(
            r#"
            INSERT INTO task_execution (
                id, task_id, name, status, kind, details, start_time, end_time,
                success, error_message, error_trace, inserted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.task_id)
        .bind(&record.name)
        .bind(record.status.as_str())
        .bind(&record.kind)
        .bind(details)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.success)
        .bind(&record.error_message)
        .bind(&record.error_trace)
        .bind(record.inserted_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Write the terminal state of an execution record
    ///
    /// Returns `false` when the row is gone, e.g. removed by a retention
    /// sweep while the payload ran.
    pub async fn complete_execution(
        conn: &mut SqliteConnection,
        record: &TaskExecutionRecord,
    ) -> Result<bool> {
        let details = serde_json::to_string(&record.details)?;

        let result = sqlx::query(
            r#"
            UPDATE task_execution SET
                status = ?, details = ?, end_time = ?, success = ?,
                error_message = ?, error_trace = ?
            WHERE id = ?
            "#,
        )
        .bind(record.status.as_str())
        .bind(details)
        .bind(record.end_time)
        .bind(record.success)
        .bind(&record.error_message)
        .bind(&record.error_trace)
        .bind(record.id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get recent executions for a task, newest first
    pub async fn list_executions(
        &self,
        task_id: &str,
        limit: i64,
    ) -> Result<Vec<TaskExecutionRecord>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT id, task_id, name, status, kind, details, start_time, end_time,
                   success, error_message, error_trace, inserted_at
            FROM task_execution
            WHERE task_id = ?
            ORDER BY start_time DESC
            LIMIT ?
            "#,
        )
        .bind(task_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Number of rows in `task_execution`
    pub async fn count_executions(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM task_execution")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Delete execution records inserted before `cutoff`
    pub async fn delete_executions_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM task_execution WHERE inserted_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Keep only the `max_rows` most recent execution records
    pub async fn trim_executions(&self, max_rows: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM task_execution
            WHERE id NOT IN (
                SELECT id FROM task_execution
                ORDER BY inserted_at DESC
                LIMIT ?
            )
            "#,
        )
        .bind(max_rows.max(0))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Fail records left `running` by a process that died mid-firing
    pub async fn fail_interrupted_executions(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE task_execution SET
                status = ?, success = FALSE, end_time = ?,
                error_message = 'interrupted: process stopped before the firing completed'
            WHERE status = ?
            "#,
        )
        .bind(ExecutionStatus::Failed.as_str())
        .bind(Utc::now())
        .bind(ExecutionStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
