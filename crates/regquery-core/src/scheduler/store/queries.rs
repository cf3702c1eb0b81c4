use super::TaskStore;
use crate::scheduler::types::{Result, TaskDescriptor, TaskRow};
use chrono::Utc;
use std::collections::HashSet;

const TASK_COLUMNS: &str = "id, schedule_kind, schedule_params, name, payload_ref, payload_args, \
                            payload_details, task_type, is_active";

/// Row counts from one registration batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// New rows
    pub inserted: usize,
    /// Existing rows rewritten in place
    pub updated: usize,
}

impl TaskStore {
    /// Insert or update descriptors in one transaction
    ///
    /// A descriptor replaces the row with its id, or failing that the row
    /// with the same `name` and `schedule_kind`, taking over that row's
    /// creation time.
    pub async fn upsert_tasks(&self, descriptors: &[TaskDescriptor]) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        let mut tx = self.pool.begin().await?;

        for descriptor in descriptors {
            let kind = descriptor.schedule_kind.as_str();
            let params = serde_json::to_string(&descriptor.schedule_params)?;
            let args = serde_json::to_string(&descriptor.payload.args)?;
            let details = serde_json::to_string(&descriptor.payload.details)?;
            let now = Utc::now();

            let existing: Option<String> = sqlx::query_scalar(
                r#"
                SELECT id FROM task
                WHERE id = ? OR (name = ? AND schedule_kind = ?)
                ORDER BY (id = ?) DESC
                LIMIT 1
                "#,
            )
            .bind(&descriptor.id)
            .bind(&descriptor.name)
            .bind(kind)
            .bind(&descriptor.id)
            .fetch_optional(&mut *tx)
            .await?;

            match existing {
                Some(row_id) => {
                    sqlx::query(
                        r#"
                        UPDATE task SET
                            id = ?, updated_at = ?, schedule_kind = ?, schedule_params = ?,
                            name = ?, payload_ref = ?, payload_args = ?, payload_details = ?,
                            task_type = ?, is_active = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(&descriptor.id)
                    .bind(now)
                    .bind(kind)
                    .bind(&params)
                    .bind(&descriptor.name)
                    .bind(&descriptor.payload.handler)
                    .bind(&args)
                    .bind(&details)
                    .bind(&descriptor.task_type)
                    .bind(descriptor.is_active)
                    .bind(row_id)
                    .execute(&mut *tx)
                    .await?;
                    outcome.updated += 1;
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO task (
                            id, created_at, updated_at, schedule_kind, schedule_params, name,
                            payload_ref, payload_args, payload_details, task_type, is_active
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&descriptor.id)
                    .bind(now)
                    .bind(now)
                    .bind(kind)
                    .bind(&params)
                    .bind(&descriptor.name)
                    .bind(&descriptor.payload.handler)
                    .bind(&args)
                    .bind(&details)
                    .bind(&descriptor.task_type)
                    .bind(descriptor.is_active)
                    .execute(&mut *tx)
                    .await?;
                    outcome.inserted += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Ids of every registered descriptor
    pub async fn task_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM task")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Get a registered descriptor by ID
    pub async fn get_task(&self, id: &str) -> Result<Option<TaskDescriptor>> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {} FROM task WHERE id = ?", TASK_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List all registered descriptors, oldest first
    pub async fn list_tasks(&self) -> Result<Vec<TaskDescriptor>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM task ORDER BY created_at ASC, id ASC",
            TASK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Number of rows in the `task` table
    pub async fn count_tasks(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM task")
            .fetch_one(&self.pool)
            .await?)
    }
}
