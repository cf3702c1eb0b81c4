//! Background task scheduling
//!
//! Decouples deferred and periodic work (request audit logging, retention
//! sweeps, enrichment jobs) from the request path. Three trigger models are
//! supported:
//!
//! - **Interval**: repeating at a fixed period
//! - **Cron**: calendar fields, optionally jittered
//! - **Date**: a single absolute instant
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │    Bootstrap     │  Static catalog reconciliation
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │  SchedulerPool   │     │   TaskRegistry   │  `task` table
//! └────────┬─────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ Backend (named)  │  Live jobs + jobs-{name}.db
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │    TaskRunner    │  HandlerRegistry + `task_execution` records
//! └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use regquery_core::scheduler::{
//!     HandlerRegistry, Payload, RetentionPolicy, ScheduleKind, SchedulerConfig,
//!     SchedulerContext, TaskDescriptor,
//! };
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register_fn("audit.log_request", |input| async move {
//!     Ok(serde_json::json!({"logged": input.details.len()}))
//! });
//!
//! let config = SchedulerConfig::new().with_data_dir("data");
//! let ctx = SchedulerContext::init(&config, handlers, RetentionPolicy::default()).await?;
//! ctx.pool.start().await;
//!
//! let task = TaskDescriptor::new(
//!     "log request",
//!     ScheduleKind::Date,
//!     params,
//!     Payload::new("audit.log_request").with_detail("path", "/v1/companies"),
//! );
//! ctx.pool.submit(task).await?;
//! ```

mod backend;
mod bootstrap;
mod context;
mod handlers;
mod pool;
mod registry;
mod retention;
mod runner;
mod store;
mod triggers;
mod types;

pub use backend::JobInfo;
pub use bootstrap::{Bootstrap, BootstrapReport};
pub use context::{SchedulerContext, RECORD_STORE_FILE};
pub use handlers::{HandlerInput, HandlerRegistry, TaskHandler};
pub use pool::{Ack, SchedulerConfig, SchedulerPool, BACKGROUND};
pub use registry::TaskRegistry;
pub use retention::{RetentionHandler, RetentionPolicy, SweepOutcome, RETENTION_HANDLER};
pub use runner::TaskRunner;
pub use store::{TaskStore, UpsertOutcome};
pub use triggers::{
    parse_timestamp, parse_timezone, CronField, CronTrigger, DateTrigger, IntervalTrigger, Trigger,
    TriggerFactory, CRON_KEYS, INTERVAL_KEYS,
};
pub use types::{
    ExecutionStatus, Payload, Result as SchedulerResult, ScheduleKind, ScheduleParams,
    SchedulerError, TaskDescriptor, TaskExecutionRecord,
};
