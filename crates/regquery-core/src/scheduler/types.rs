//! Scheduler task types and error definitions
//!
//! Contains the descriptor, execution record and error types shared by
//! every scheduler component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Kind-specific schedule parameters (`hours = 1`, `run_time = "..."`, ...)
pub type ScheduleParams = Map<String, Value>;

/// Scheduler error types
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Schedule kind outside interval/cron/date
    #[error("unsupported schedule kind '{0}', expected one of: interval, cron, date")]
    UnsupportedKind(String),
    /// Schedule params carry keys the kind does not accept
    #[error("invalid {kind} schedule params: {}", .keys.join(", "))]
    InvalidParams {
        /// Schedule kind being validated
        kind: ScheduleKind,
        /// Offending keys, sorted
        keys: Vec<String>,
    },
    /// Required schedule param is absent
    #[error("{kind} schedule requires '{key}'")]
    MissingParam {
        /// Schedule kind being validated
        kind: ScheduleKind,
        /// Missing key
        key: &'static str,
    },
    /// Schedule param present but unusable
    #[error("invalid value for '{key}': {message}")]
    InvalidValue {
        /// Param key
        key: String,
        /// What is wrong with it
        message: String,
    },
    /// No backend registered under this name
    #[error("unknown backend '{name}', available: {}", .available.join(", "))]
    UnknownBackend {
        /// Requested backend
        name: String,
        /// Backends the pool owns
        available: Vec<String>,
    },
    /// Job id not scheduled on the backend
    #[error("job '{id}' is not scheduled on backend '{backend}'")]
    JobNotFound {
        /// Backend name
        backend: String,
        /// Descriptor id
        id: String,
    },
    /// Payload key with no registered handler
    #[error("no handler registered for payload '{0}'")]
    UnknownHandler(String),
    /// Record store or job store unreachable
    #[error("store unavailable: {0}")]
    Store(#[from] sqlx::Error),
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Schema migration failure
    #[error("migration failed: {0}")]
    Migration(String),
}

impl SchedulerError {
    /// Whether this error rejects a descriptor's schedule definition
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedKind(_)
                | Self::InvalidParams { .. }
                | Self::MissingParam { .. }
                | Self::InvalidValue { .. }
        )
    }
}

/// Temporal trigger model of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Fixed period
    Interval,
    /// Calendar fields
    Cron,
    /// Single absolute instant
    Date,
}

impl ScheduleKind {
    /// Stable name used in storage and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Cron => "cron",
            Self::Date => "date",
        }
    }

    /// Whether jobs of this kind stay registered after firing
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::Date)
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "interval" => Ok(Self::Interval),
            "cron" => Ok(Self::Cron),
            "date" => Ok(Self::Date),
            other => Err(SchedulerError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Work executed at fire time: a handler key plus its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Key into the handler registry
    pub handler: String,
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl Payload {
    /// Create a payload with no arguments
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            args: Vec::new(),
            details: Map::new(),
        }
    }

    /// Append a positional argument
    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set a keyword argument
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Declarative definition of one schedulable unit of work
///
/// Equality ignores `id`, `is_active` and payload arguments: two descriptors
/// are the same job when kind, params, name and handler key match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Unique id, generated when not supplied
    pub id: String,
    /// Human label, not required to be unique
    pub name: String,
    /// Trigger model
    pub schedule_kind: ScheduleKind,
    /// Trigger parameters
    #[serde(default)]
    pub schedule_params: ScheduleParams,
    /// Work to run
    pub payload: Payload,
    /// Category recorded on every execution of this task
    #[serde(default = "default_task_type")]
    pub task_type: String,
    /// Advisory flag, honored by bootstrap
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_task_type() -> String {
    "scheduled".to_string()
}

fn default_active() -> bool {
    true
}

impl TaskDescriptor {
    /// Create a descriptor with a freshly generated id
    pub fn new(
        name: impl Into<String>,
        schedule_kind: ScheduleKind,
        schedule_params: ScheduleParams,
        payload: Payload,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            schedule_kind,
            schedule_params,
            payload,
            task_type: default_task_type(),
            is_active: true,
        }
    }

    /// Use a caller-chosen id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the task type
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    /// Set the active flag
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}

impl PartialEq for TaskDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.schedule_kind == other.schedule_kind
            && self.schedule_params == other.schedule_params
            && self.name == other.name
            && self.payload.handler == other.payload.handler
    }
}

/// Lifecycle state of one execution record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Payload has been invoked and not yet returned
    Running,
    /// Payload returned normally
    Success,
    /// Payload raised or panicked
    Failed,
}

impl ExecutionStatus {
    /// Stable name used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(SchedulerError::InvalidValue {
                key: "status".to_string(),
                message: format!("unknown execution status '{}'", other),
            }),
        }
    }
}

/// Audit record of one firing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    /// Execution ID
    pub id: Uuid,
    /// Descriptor that fired
    pub task_id: String,
    /// Descriptor name at fire time
    pub name: String,
    /// Descriptor task type
    pub kind: String,
    /// Payload details, plus `result` on success
    pub details: Map<String, Value>,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// End time
    pub end_time: Option<DateTime<Utc>>,
    /// Whether the payload returned normally
    pub success: bool,
    /// Execution status
    pub status: ExecutionStatus,
    /// Stringified payload error
    pub error_message: Option<String>,
    /// Payload error with its cause chain
    pub error_trace: Option<String>,
    /// Row insertion time
    pub inserted_at: DateTime<Utc>,
}

impl TaskExecutionRecord {
    /// Open a `running` record for a descriptor about to fire
    pub fn start(descriptor: &TaskDescriptor) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            kind: descriptor.task_type.clone(),
            details: descriptor.payload.details.clone(),
            start_time: now,
            end_time: None,
            success: false,
            status: ExecutionStatus::Running,
            error_message: None,
            error_trace: None,
            inserted_at: now,
        }
    }

    /// Move to `success`, keeping the payload's return value
    pub fn succeed(&mut self, result: Value) {
        self.status = ExecutionStatus::Success;
        self.success = true;
        self.details.insert("result".to_string(), result);
        self.end_time = Some(Utc::now());
    }

    /// Move to `failed`
    pub fn fail(&mut self, message: String, trace: String) {
        self.status = ExecutionStatus::Failed;
        self.success = false;
        self.error_message = Some(message);
        self.error_trace = Some(trace);
        self.end_time = Some(Utc::now());
    }
}

/// Internal row type for execution queries
#[derive(FromRow)]
pub(super) struct ExecutionRow {
    pub id: String,
    pub task_id: String,
    pub name: String,
    pub status: String,
    pub kind: String,
    pub details: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub success: bool,
    pub error_message: Option<String>,
    pub error_trace: Option<String>,
    pub inserted_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for TaskExecutionRecord {
    type Error = SchedulerError;

    fn try_from(row: ExecutionRow) -> Result<Self> {
        Ok(TaskExecutionRecord {
            id: Uuid::parse_str(&row.id).map_err(|e| SchedulerError::InvalidValue {
                key: "id".to_string(),
                message: e.to_string(),
            })?,
            task_id: row.task_id,
            name: row.name,
            kind: row.kind,
            details: serde_json::from_str(&row.details)?,
            start_time: row.start_time,
            end_time: row.end_time,
            success: row.success,
            status: row.status.parse()?,
            error_message: row.error_message,
            error_trace: row.error_trace,
            inserted_at: row.inserted_at,
        })
    }
}

/// Internal row type for the `task` table
#[derive(FromRow)]
pub(super) struct TaskRow {
    pub id: String,
    pub schedule_kind: String,
    pub schedule_params: String,
    pub name: String,
    pub payload_ref: String,
    pub payload_args: String,
    pub payload_details: String,
    pub task_type: String,
    pub is_active: bool,
}

impl TryFrom<TaskRow> for TaskDescriptor {
    type Error = SchedulerError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(TaskDescriptor {
            id: row.id,
            name: row.name,
            schedule_kind: row.schedule_kind.parse()?,
            schedule_params: serde_json::from_str(&row.schedule_params)?,
            payload: Payload {
                handler: row.payload_ref,
                args: serde_json::from_str(&row.payload_args)?,
                details: serde_json::from_str(&row.payload_details)?,
            },
            task_type: row.task_type,
            is_active: row.is_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> ScheduleParams {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_descriptor_generates_id() {
        let a = TaskDescriptor::new(
            "sweep",
            ScheduleKind::Interval,
            params(json!({"hours": 1})),
            Payload::new("noop"),
        );
        let b = a.clone().with_id("fixed");
        assert!(!a.id.is_empty());
        assert_eq!(b.id, "fixed");
    }

    #[test]
    fn test_descriptor_equality_ignores_id_and_args() {
        let a = TaskDescriptor::new(
            "sweep",
            ScheduleKind::Cron,
            params(json!({"hour": "0"})),
            Payload::new("cleanup").with_arg(1),
        );
        let b = a.clone().with_id("other").with_active(false);
        let mut c = b.clone();
        c.payload = Payload::new("cleanup").with_arg(2);
        assert_eq!(a, b);
        assert_eq!(a, c);

        let mut d = a.clone();
        d.payload.handler = "other".to_string();
        assert_ne!(a, d);
    }

    #[test]
    fn test_schedule_kind_parse() {
        assert_eq!("cron".parse::<ScheduleKind>().unwrap(), ScheduleKind::Cron);
        let err = "weekly".parse::<ScheduleKind>().unwrap_err();
        assert!(err.is_configuration());
        let msg = err.to_string();
        assert!(msg.contains("interval") && msg.contains("cron") && msg.contains("date"));
    }

    #[test]
    fn test_record_transitions() {
        let descriptor = TaskDescriptor::new(
            "audit",
            ScheduleKind::Date,
            params(json!({"run_time": "2030-01-01T00:00:00Z"})),
            Payload::new("log").with_detail("path", "/v1/companies"),
        )
        .with_task_type("request_log");

        let mut record = TaskExecutionRecord::start(&descriptor);
        assert_eq!(record.status, ExecutionStatus::Running);
        assert_eq!(record.kind, "request_log");
        assert!(record.end_time.is_none());

        record.succeed(json!(3));
        assert!(record.success);
        assert_eq!(record.details["result"], json!(3));
        assert_eq!(record.details["path"], json!("/v1/companies"));
        assert!(record.end_time.unwrap() >= record.start_time);
    }
}
