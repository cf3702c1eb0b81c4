//! Application context for the scheduler
//!
//! Built once at start-up and passed by reference; nothing in the scheduler
//! reaches for global state.

use std::sync::Arc;
use tracing::{info, warn};

use super::bootstrap::{Bootstrap, BootstrapReport};
use super::handlers::HandlerRegistry;
use super::pool::{SchedulerConfig, SchedulerPool};
use super::registry::TaskRegistry;
use super::retention::{RetentionHandler, RetentionPolicy, RETENTION_HANDLER};
use super::runner::TaskRunner;
use super::store::TaskStore;
use super::types::{Result, TaskDescriptor};

/// File name of the record store inside the data directory
pub const RECORD_STORE_FILE: &str = "tasks.db";

/// Every scheduler component, wired together
pub struct SchedulerContext {
    /// Record store (`task` and `task_execution`)
    pub store: Arc<TaskStore>,
    /// Payload handlers
    pub handlers: Arc<HandlerRegistry>,
    /// Runner shared by every backend
    pub runner: TaskRunner,
    /// Named backends
    pub pool: SchedulerPool,
    /// Descriptor registry
    pub registry: TaskRegistry,
}

impl SchedulerContext {
    /// Open the stores, register the retention sweep and build the pool
    ///
    /// The pool is not started; read-only tools can inspect it safely.
    pub async fn init(
        config: &SchedulerConfig,
        mut handlers: HandlerRegistry,
        retention: RetentionPolicy,
    ) -> Result<Self> {
        let store = Arc::new(TaskStore::from_path(&config.data_dir.join(RECORD_STORE_FILE)).await?);

        handlers.register(
            RETENTION_HANDLER,
            Arc::new(RetentionHandler::new(store.clone(), retention)),
        );
        let handlers = Arc::new(handlers);

        let runner = TaskRunner::new(store.clone(), handlers.clone());
        let pool = SchedulerPool::new(config, runner.clone()).await?;
        let registry = TaskRegistry::new(store.clone());

        info!(handlers = ?handlers.keys(), "Scheduler context ready");
        Ok(Self {
            store,
            handlers,
            runner,
            pool,
            registry,
        })
    }

    /// Take over scheduling: fail records a dead process left `running`,
    /// then start every backend
    pub async fn start(&self) -> Result<()> {
        let interrupted = self.store.fail_interrupted_executions().await?;
        if interrupted > 0 {
            warn!(count = interrupted, "Marked interrupted executions as failed");
        }
        self.pool.start().await;
        Ok(())
    }

    /// Reconcile `catalog` onto the background backend
    pub async fn bootstrap(&self, catalog: Vec<TaskDescriptor>) -> Result<BootstrapReport> {
        Bootstrap::new(catalog).run(&self.pool, &self.registry).await
    }

    /// Stop the pool and close the record store
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        self.store.close().await;
    }
}
