//! Task registry
//!
//! Persists descriptors in the `task` table so registration is idempotent
//! across restarts.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::store::{TaskStore, UpsertOutcome};
use super::triggers::TriggerFactory;
use super::types::{Result, TaskDescriptor};

/// Restart-safe catalog of registered descriptors
#[derive(Clone)]
pub struct TaskRegistry {
    store: Arc<TaskStore>,
}

impl TaskRegistry {
    /// Create a registry over the record store
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }

    /// Insert or update descriptors
    ///
    /// Every descriptor is validated before any row is written; one bad
    /// descriptor rejects the whole batch.
    pub async fn register(&self, descriptors: &[TaskDescriptor]) -> Result<UpsertOutcome> {
        for descriptor in descriptors {
            TriggerFactory::build(descriptor.schedule_kind, &descriptor.schedule_params)?;
        }

        let outcome = self.store.upsert_tasks(descriptors).await?;
        info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            "Registered task descriptors"
        );
        Ok(outcome)
    }

    /// Ids of all registered descriptors
    pub async fn known_ids(&self) -> Result<HashSet<String>> {
        self.store.task_ids().await
    }

    /// Reconstruct every registered descriptor
    pub async fn load(&self) -> Result<Vec<TaskDescriptor>> {
        self.store.list_tasks().await
    }

    /// Look up one descriptor
    pub async fn get(&self, id: &str) -> Result<Option<TaskDescriptor>> {
        self.store.get_task(id).await
    }
}
