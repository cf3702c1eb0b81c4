//! Scheduler pool
//!
//! Owns the named backends for the life of the process. Backends are
//! created once by [`SchedulerPool::new`]; callers address them by name.

use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::backend::{Backend, JobInfo};
use super::runner::TaskRunner;
use super::types::{Result, SchedulerError, TaskDescriptor};

/// Backend used for one-off and catalog jobs
pub const BACKGROUND: &str = "background";

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Directory holding each backend's `jobs-{name}.db`
    pub data_dir: PathBuf,
    /// Backend names to create
    pub backends: Vec<String>,
    /// Maximum concurrent firings per backend
    pub max_concurrent: usize,
    /// Longest a backend loop sleeps before re-checking its jobs
    pub max_idle_secs: u64,
    /// How long shutdown waits for in-flight firings
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            backends: vec![BACKGROUND.to_string()],
            max_concurrent: 4,
            max_idle_secs: 60,
            shutdown_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the job store directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the backend names
    pub fn with_backends<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backends = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set max concurrent firings per backend
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the idle re-check bound
    pub fn with_max_idle(mut self, secs: u64) -> Self {
        self.max_idle_secs = secs;
        self
    }

    /// Set the shutdown wait
    pub fn with_shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }
}

/// Acknowledgement of an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    /// Descriptor id now scheduled
    pub id: String,
    /// Backend holding it
    pub backend: String,
}

/// Registry of named backends
pub struct SchedulerPool {
    backends: BTreeMap<String, Arc<Backend>>,
    shutdown_timeout: Duration,
}

impl SchedulerPool {
    /// Create every configured backend, recovering their persisted jobs
    pub async fn new(config: &SchedulerConfig, runner: TaskRunner) -> Result<Self> {
        let mut backends = BTreeMap::new();
        for name in &config.backends {
            let backend = Backend::open(name, &config.data_dir, runner.clone(), config).await?;
            backends.insert(name.clone(), backend);
        }

        info!(backends = ?backends.keys().collect::<Vec<_>>(), "Scheduler pool created");
        Ok(Self {
            backends,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        })
    }

    /// Start every backend loop without waiting on them
    pub async fn start(&self) {
        join_all(self.backends.values().map(|backend| backend.start())).await;
        info!("Scheduler pool started");
    }

    /// Stop every backend, letting in-flight firings finish within the timeout
    pub async fn shutdown(&self) {
        let timeout = self.shutdown_timeout;
        join_all(
            self.backends
                .values()
                .map(|backend| backend.shutdown(timeout)),
        )
        .await;
        info!("Scheduler pool stopped");
    }

    /// Names of the backends this pool owns
    pub fn backend_names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    fn backend(&self, name: &str) -> Result<&Arc<Backend>> {
        self.backends
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownBackend {
                name: name.to_string(),
                available: self.backend_names(),
            })
    }

    /// Schedule `descriptor` on `backend`, replacing any job with its id
    pub async fn add(&self, backend: &str, descriptor: TaskDescriptor) -> Result<()> {
        self.backend(backend)?.add(descriptor).await
    }

    /// Unschedule a job
    pub async fn remove(&self, backend: &str, id: &str) -> Result<()> {
        self.backend(backend)?.remove(id).await
    }

    /// Live jobs on `backend`
    pub async fn list(&self, backend: &str) -> Result<Vec<JobInfo>> {
        Ok(self.backend(backend)?.list().await)
    }

    /// Whether `id` is live on `backend`
    pub async fn contains(&self, backend: &str, id: &str) -> Result<bool> {
        Ok(self.backend(backend)?.contains(id).await)
    }

    /// Fire-and-forget registration of a one-off or ad-hoc job
    pub async fn submit(&self, descriptor: TaskDescriptor) -> Result<Ack> {
        let id = descriptor.id.clone();
        self.add(BACKGROUND, descriptor).await?;
        Ok(Ack {
            id,
            backend: BACKGROUND.to_string(),
        })
    }
}

impl std::fmt::Debug for SchedulerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerPool")
            .field("backends", &self.backend_names())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::handlers::HandlerRegistry;
    use crate::scheduler::store::TaskStore;
    use crate::scheduler::types::{Payload, ScheduleKind};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    async fn create_pool(dir: &TempDir) -> SchedulerPool {
        let store = Arc::new(
            TaskStore::from_path(&dir.path().join("tasks.db"))
                .await
                .unwrap(),
        );
        let mut handlers = HandlerRegistry::new();
        handlers.register_fn("noop", |_| async { Ok(Value::Null) });
        let runner = TaskRunner::new(store, Arc::new(handlers));
        let config = SchedulerConfig::new()
            .with_data_dir(dir.path())
            .with_backends(["background", "maintenance"]);
        SchedulerPool::new(&config, runner).await.unwrap()
    }

    fn hourly() -> TaskDescriptor {
        TaskDescriptor::new(
            "hourly",
            ScheduleKind::Interval,
            json!({"hours": 1}).as_object().cloned().unwrap(),
            Payload::new("noop"),
        )
    }

    #[tokio::test]
    async fn test_unknown_backend_names_available() {
        let dir = TempDir::new().unwrap();
        let pool = create_pool(&dir).await;

        let err = pool.add("realtime", hourly()).await.unwrap_err();
        match &err {
            SchedulerError::UnknownBackend { name, available } => {
                assert_eq!(name, "realtime");
                assert_eq!(available, &vec!["background", "maintenance"]);
            }
            other => panic!("Expected UnknownBackend, got {other:?}"),
        }
        assert!(err.to_string().contains("background, maintenance"));
        assert!(pool.list("realtime").await.is_err());
        assert!(pool.remove("realtime", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_submit_targets_background() {
        let dir = TempDir::new().unwrap();
        let pool = create_pool(&dir).await;

        let task = hourly();
        let ack = pool.submit(task.clone()).await.unwrap();
        assert_eq!(ack.id, task.id);
        assert_eq!(ack.backend, BACKGROUND);
        assert!(pool.contains(BACKGROUND, &task.id).await.unwrap());
        assert!(pool.list("maintenance").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_params_leave_no_job() {
        let dir = TempDir::new().unwrap();
        let pool = create_pool(&dir).await;

        let mut task = hourly();
        task.schedule_params.insert("hour".to_string(), json!(3));
        let err = pool.add(BACKGROUND, task).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(pool.list(BACKGROUND).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_handler_rejected() {
        let dir = TempDir::new().unwrap();
        let pool = create_pool(&dir).await;

        let mut task = hourly();
        task.payload = Payload::new("missing");
        let err = pool.add(BACKGROUND, task).await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownHandler(ref k) if k == "missing"));
    }
}
