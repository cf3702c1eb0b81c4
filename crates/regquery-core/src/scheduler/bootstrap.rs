//! Start-up reconciliation of the static task catalog
//!
//! The backend's job store is authoritative for what is scheduled; the
//! `task` table records what has been registered. For each catalog entry:
//!
//! - inactive: registered as inactive, never scheduled, unscheduled if live
//! - unknown id: scheduled, then registered
//! - known id registered inactive, now active: scheduled whatever its kind
//! - known id whose definition changed: rescheduled and re-registered
//! - known recurring id missing from the backend: scheduled again
//! - known `date` id: left alone, it has already fired or is still pending

use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use super::pool::{SchedulerPool, BACKGROUND};
use super::registry::TaskRegistry;
use super::triggers::TriggerFactory;
use super::types::{Result, TaskDescriptor};

/// What one reconciliation pass did, by descriptor id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Newly scheduled and registered
    pub scheduled: Vec<String>,
    /// Registered earlier but missing from the backend, scheduled again
    pub restored: Vec<String>,
    /// Definition differs from the registered row, rescheduled
    pub updated: Vec<String>,
    /// Registered and live, untouched
    pub unchanged: Vec<String>,
    /// Inactive, registered but not scheduled
    pub inactive: Vec<String>,
}

/// Reconciles a static catalog against the registry and a backend
#[derive(Debug, Clone)]
pub struct Bootstrap {
    catalog: Vec<TaskDescriptor>,
    backend: String,
}

impl Bootstrap {
    /// Bootstrap `catalog` onto the background backend
    pub fn new(catalog: Vec<TaskDescriptor>) -> Self {
        Self {
            catalog,
            backend: BACKGROUND.to_string(),
        }
    }

    /// Target another backend
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Catalog entries
    pub fn catalog(&self) -> &[TaskDescriptor] {
        &self.catalog
    }

    /// Run one reconciliation pass; safe to repeat
    pub async fn run(&self, pool: &SchedulerPool, registry: &TaskRegistry) -> Result<BootstrapReport> {
        // A bad catalog entry aborts before anything is scheduled.
        for descriptor in &self.catalog {
            TriggerFactory::build(descriptor.schedule_kind, &descriptor.schedule_params)?;
        }

        let registered: HashMap<String, TaskDescriptor> = registry
            .load()
            .await?
            .into_iter()
            .map(|descriptor| (descriptor.id.clone(), descriptor))
            .collect();
        let mut report = BootstrapReport::default();

        for descriptor in &self.catalog {
            let id = descriptor.id.clone();
            let live = pool.contains(&self.backend, &id).await?;

            if !descriptor.is_active {
                registry.register(std::slice::from_ref(descriptor)).await?;
                if live {
                    pool.remove(&self.backend, &id).await?;
                    warn!(task_id = %id, name = %descriptor.name, "Unscheduled inactive task");
                }
                report.inactive.push(id);
                continue;
            }

            let Some(row) = registered.get(&id) else {
                pool.add(&self.backend, descriptor.clone()).await?;
                registry.register(std::slice::from_ref(descriptor)).await?;
                report.scheduled.push(id);
                continue;
            };

            if !row.is_active {
                pool.add(&self.backend, descriptor.clone()).await?;
                registry.register(std::slice::from_ref(descriptor)).await?;
                info!(task_id = %id, name = %descriptor.name, "Scheduled reactivated task");
                report.scheduled.push(id);
            } else if !same_definition(row, descriptor) {
                pool.add(&self.backend, descriptor.clone()).await?;
                registry.register(std::slice::from_ref(descriptor)).await?;
                info!(task_id = %id, name = %descriptor.name, "Rescheduled changed task");
                report.updated.push(id);
            } else if descriptor.schedule_kind.is_recurring() && !live {
                pool.add(&self.backend, descriptor.clone()).await?;
                registry.register(std::slice::from_ref(descriptor)).await?;
                info!(task_id = %id, name = %descriptor.name, "Restored task missing from backend");
                report.restored.push(id);
            } else {
                report.unchanged.push(id);
            }
        }

        info!(
            backend = %self.backend,
            scheduled = report.scheduled.len(),
            restored = report.restored.len(),
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            inactive = report.inactive.len(),
            "Catalog bootstrap complete"
        );
        Ok(report)
    }
}

/// Whether a catalog entry matches its registered row, payload arguments
/// and task type included
fn same_definition(registered: &TaskDescriptor, entry: &TaskDescriptor) -> bool {
    registered == entry
        && registered.payload.args == entry.payload.args
        && registered.payload.details == entry.payload.details
        && registered.task_type == entry.task_type
}
