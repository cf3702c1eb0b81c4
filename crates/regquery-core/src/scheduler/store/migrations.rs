use super::TaskStore;
use crate::scheduler::types::{Result, SchedulerError};

const STATEMENTS: &[(&str, &str)] = &[
    (
        "task",
        r#"
        CREATE TABLE IF NOT EXISTS task (
            id TEXT PRIMARY KEY,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            schedule_kind TEXT NOT NULL,
            schedule_params TEXT NOT NULL,
            name TEXT NOT NULL,
            payload_ref TEXT NOT NULL,
            payload_args TEXT NOT NULL DEFAULT '[]',
            payload_details TEXT NOT NULL DEFAULT '{}',
            task_type TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
    ),
    (
        // task_id is not a foreign key: ad-hoc jobs never get a task row.
        "task_execution",
        r#"
        CREATE TABLE IF NOT EXISTS task_execution (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            kind TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '{}',
            start_time TIMESTAMP NOT NULL,
            end_time TIMESTAMP,
            success BOOLEAN NOT NULL DEFAULT FALSE,
            error_message TEXT,
            error_trace TEXT,
            inserted_at TIMESTAMP NOT NULL
        )
        "#,
    ),
    (
        "idx_task_name_kind",
        "CREATE INDEX IF NOT EXISTS idx_task_name_kind ON task(name, schedule_kind)",
    ),
    (
        "idx_execution_task",
        "CREATE INDEX IF NOT EXISTS idx_execution_task ON task_execution(task_id)",
    ),
    (
        "idx_execution_inserted",
        "CREATE INDEX IF NOT EXISTS idx_execution_inserted ON task_execution(inserted_at)",
    ),
];

impl TaskStore {
    /// Run database migrations
    pub(super) async fn migrate(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchedulerError::Migration(e.to_string()))?;

        for (name, statement) in STATEMENTS {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| SchedulerError::Migration(format!("{}: {}", name, e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| SchedulerError::Migration(e.to_string()))?;

        Ok(())
    }
}
