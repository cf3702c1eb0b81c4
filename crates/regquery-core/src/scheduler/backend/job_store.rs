//! Durable job store of one backend
//!
//! A backend's live jobs are mirrored into its own SQLite file so that
//! schedules, including the next fire time, survive a restart.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Sqlite};
use std::path::Path;

use crate::scheduler::store::open_pool;
use crate::scheduler::types::{Result, SchedulerError, TaskDescriptor};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS scheduled_jobs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        schedule_kind TEXT NOT NULL,
        schedule_params TEXT NOT NULL,
        payload TEXT NOT NULL,
        task_type TEXT NOT NULL,
        is_active BOOLEAN NOT NULL,
        next_run_time TIMESTAMP NOT NULL
    )
"#;

/// A persisted job: the descriptor plus when it fires next
#[derive(Debug, Clone)]
pub struct StoredJob {
    /// Job definition
    pub descriptor: TaskDescriptor,
    /// Next scheduled firing
    pub next_run_time: DateTime<Utc>,
}

#[derive(FromRow)]
struct JobRow {
    id: String,
    name: String,
    schedule_kind: String,
    schedule_params: String,
    payload: String,
    task_type: String,
    is_active: bool,
    next_run_time: DateTime<Utc>,
}

impl TryFrom<JobRow> for StoredJob {
    type Error = SchedulerError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(StoredJob {
            descriptor: TaskDescriptor {
                id: row.id,
                name: row.name,
                schedule_kind: row.schedule_kind.parse()?,
                schedule_params: serde_json::from_str(&row.schedule_params)?,
                payload: serde_json::from_str(&row.payload)?,
                task_type: row.task_type,
                is_active: row.is_active,
            },
            next_run_time: row.next_run_time,
        })
    }
}

/// SQLite-backed job persistence for a single backend
pub struct JobStore {
    pool: Pool<Sqlite>,
}

impl JobStore {
    /// Open (creating if needed) the job store at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = open_pool(path, 2).await?;
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| SchedulerError::Migration(format!("scheduled_jobs: {}", e)))?;
        Ok(Self { pool })
    }

    /// Insert or replace the job with the descriptor's id
    pub async fn save(&self, descriptor: &TaskDescriptor, next_run_time: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO scheduled_jobs (
                id, name, schedule_kind, schedule_params, payload, task_type,
                is_active, next_run_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&descriptor.id)
        .bind(&descriptor.name)
        .bind(descriptor.schedule_kind.as_str())
        .bind(serde_json::to_string(&descriptor.schedule_params)?)
        .bind(serde_json::to_string(&descriptor.payload)?)
        .bind(&descriptor.task_type)
        .bind(descriptor.is_active)
        .bind(next_run_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Move a job's next fire time
    pub async fn update_next_run(&self, id: &str, next_run_time: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE scheduled_jobs SET next_run_time = ? WHERE id = ?")
            .bind(next_run_time)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a job; `false` if it was not stored
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load every persisted job, soonest first
    ///
    /// Rows that no longer decode are skipped and reported by id.
    pub async fn load_all(&self) -> Result<(Vec<StoredJob>, Vec<String>)> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT id, name, schedule_kind, schedule_params, payload, task_type,
                   is_active, next_run_time
            FROM scheduled_jobs
            ORDER BY next_run_time ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        let mut broken = Vec::new();
        for row in rows {
            let id = row.id.clone();
            match StoredJob::try_from(row) {
                Ok(job) => jobs.push(job),
                Err(_) => broken.push(id),
            }
        }
        Ok((jobs, broken))
    }

    /// Close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
