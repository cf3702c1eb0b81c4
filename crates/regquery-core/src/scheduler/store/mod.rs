//! Record store using SQLite
//!
//! Holds the `task` table (registered descriptors) and the `task_execution`
//! table (one audit row per firing). Every firing acquires its own pooled
//! connection; the pool runs in WAL mode so retention deletes and new
//! inserts can proceed side by side.

mod executions;
mod migrations;
mod queries;

#[cfg(test)]
mod tests;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

use crate::scheduler::types::Result;

pub use queries::UpsertOutcome;

/// SQLite-based record store
pub struct TaskStore {
    pool: Pool<Sqlite>,
}

impl TaskStore {
    /// Open (creating if needed) the store at `path` and run migrations
    pub async fn from_path(path: &Path) -> Result<Self> {
        let pool = open_pool(path, 5).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Check out a connection; it returns to the pool when dropped
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Open a WAL-mode SQLite pool, creating the file and its directory
pub(crate) async fn open_pool(path: &Path, max_connections: u32) -> Result<Pool<Sqlite>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}
