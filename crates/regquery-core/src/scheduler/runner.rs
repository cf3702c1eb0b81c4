//! Task runner
//!
//! Executes one descriptor at fire time and keeps the audit trail: one
//! `task_execution` row inserted as `running`, then moved exactly once to
//! `success` or `failed`. Payload errors and panics end here.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::handlers::{HandlerInput, HandlerRegistry};
use super::store::TaskStore;
use super::types::{Result, TaskDescriptor, TaskExecutionRecord};

/// Runs payloads and records their outcome
#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<TaskStore>,
    handlers: Arc<HandlerRegistry>,
}

impl TaskRunner {
    /// Create a runner over a record store and handler registry
    pub fn new(store: Arc<TaskStore>, handlers: Arc<HandlerRegistry>) -> Self {
        Self { store, handlers }
    }

    /// Record store the runner writes to
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Handler registry payload keys resolve against
    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    /// Fire `descriptor` once
    ///
    /// Only store failures are returned; a payload that errors or panics
    /// yields `Ok` with a `failed` record.
    pub async fn run(&self, descriptor: &TaskDescriptor) -> Result<TaskExecutionRecord> {
        // Released back to the pool on every exit path when dropped.
        let mut conn = self.store.acquire().await?;

        let mut record = TaskExecutionRecord::start(descriptor);
        TaskStore::insert_execution(&mut conn, &record).await?;

        debug!(
            task_id = %descriptor.id,
            execution_id = %record.id,
            handler = %descriptor.payload.handler,
            "Firing task"
        );
        let started = Instant::now();

        match self.invoke(descriptor).await {
            Ok(value) => record.succeed(value),
            Err((message, trace)) => {
                warn!(
                    task_id = %descriptor.id,
                    name = %descriptor.name,
                    "Task payload failed: {}",
                    message
                );
                record.fail(message, trace);
            }
        }

        if !TaskStore::complete_execution(&mut conn, &record).await? {
            warn!(
                execution_id = %record.id,
                "Execution record vanished before completion, likely swept by retention"
            );
        }

        info!(
            task_id = %descriptor.id,
            name = %descriptor.name,
            status = %record.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Task finished"
        );
        Ok(record)
    }

    /// Run the payload in its own task so a panic cannot unwind into the
    /// backend loop
    async fn invoke(
        &self,
        descriptor: &TaskDescriptor,
    ) -> std::result::Result<serde_json::Value, (String, String)> {
        let handler = self
            .handlers
            .resolve(&descriptor.payload.handler)
            .map_err(|e| (e.to_string(), format!("{:?}", e)))?;
        let input = HandlerInput::new(descriptor.id.clone(), &descriptor.payload);

        match tokio::spawn(async move { handler.call(input).await }).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err((e.to_string(), format!("{:?}", e))),
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                error!(task_id = %descriptor.id, "Task payload panicked: {}", message);
                Err((format!("payload panicked: {}", message), message))
            }
            Err(join_err) => Err((join_err.to_string(), format!("{:?}", join_err))),
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}
