//! A named scheduler backend
//!
//! Holds its live jobs in memory, mirrors them to a [`JobStore`], and runs
//! one tokio task that sleeps until the next job is due. Each firing is
//! spawned separately and bounded by a semaphore; a job whose previous
//! firing is still running is skipped and rescheduled.

mod job_store;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pool::SchedulerConfig;
use super::runner::TaskRunner;
use super::triggers::{Trigger, TriggerFactory};
use super::types::{Result, ScheduleKind, SchedulerError, TaskDescriptor};

pub use job_store::{JobStore, StoredJob};

/// Introspection view of one live job
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    /// Descriptor id
    pub id: String,
    /// Descriptor name
    pub name: String,
    /// Trigger model
    pub schedule_kind: ScheduleKind,
    /// Payload handler key
    pub handler: String,
    /// Next scheduled firing
    pub next_run_time: DateTime<Utc>,
    /// Whether a firing is in progress
    pub running: bool,
}

struct ScheduledJob {
    descriptor: TaskDescriptor,
    trigger: Trigger,
    next_run_time: DateTime<Utc>,
}

/// One named scheduler instance
pub struct Backend {
    name: String,
    jobs: RwLock<HashMap<String, ScheduledJob>>,
    store: JobStore,
    runner: TaskRunner,
    in_flight: Mutex<HashSet<String>>,
    wake: Notify,
    permits: Arc<Semaphore>,
    max_idle: Duration,
    shutdown: CancellationToken,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Backend {
    /// Open the backend's job store under `data_dir` and recover its jobs
    pub async fn open(
        name: &str,
        data_dir: &Path,
        runner: TaskRunner,
        config: &SchedulerConfig,
    ) -> Result<Arc<Self>> {
        let store = JobStore::open(&data_dir.join(format!("jobs-{}.db", name))).await?;

        let backend = Arc::new(Self {
            name: name.to_string(),
            jobs: RwLock::new(HashMap::new()),
            store,
            runner,
            in_flight: Mutex::new(HashSet::new()),
            wake: Notify::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            max_idle: Duration::from_secs(config.max_idle_secs.max(1)),
            shutdown: CancellationToken::new(),
            handle: tokio::sync::Mutex::new(None),
        });
        backend.recover().await?;
        Ok(backend)
    }

    /// Reload persisted jobs, keeping their stored next fire time
    async fn recover(&self) -> Result<()> {
        let (stored, broken) = self.store.load_all().await?;
        for id in broken {
            warn!(backend = %self.name, job_id = %id, "Dropping undecodable persisted job");
            self.store.delete(&id).await?;
        }

        let mut jobs = self.jobs.write().await;
        for StoredJob {
            descriptor,
            next_run_time,
        } in stored
        {
            match TriggerFactory::build(descriptor.schedule_kind, &descriptor.schedule_params) {
                Ok(trigger) => {
                    jobs.insert(
                        descriptor.id.clone(),
                        ScheduledJob {
                            descriptor,
                            trigger,
                            next_run_time,
                        },
                    );
                }
                Err(e) => {
                    warn!(
                        backend = %self.name,
                        job_id = %descriptor.id,
                        "Dropping persisted job with invalid schedule: {}",
                        e
                    );
                    self.store.delete(&descriptor.id).await?;
                }
            }
        }

        if !jobs.is_empty() {
            info!(backend = %self.name, jobs = jobs.len(), "Recovered persisted jobs");
        }
        Ok(())
    }

    /// Backend name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register or replace the job for `descriptor.id`
    ///
    /// Validation happens before the job store or the live set is touched.
    pub async fn add(&self, descriptor: TaskDescriptor) -> Result<()> {
        let trigger = TriggerFactory::build(descriptor.schedule_kind, &descriptor.schedule_params)?;
        if !self.runner.handlers().contains(&descriptor.payload.handler) {
            return Err(SchedulerError::UnknownHandler(
                descriptor.payload.handler.clone(),
            ));
        }

        let mut jobs = self.jobs.write().await;
        let Some(next_run_time) = trigger
            .next_fire_time(None, Utc::now())
            .map(|t| trigger.apply_jitter(t))
        else {
            warn!(
                backend = %self.name,
                job_id = %descriptor.id,
                "Trigger will never fire, job not scheduled"
            );
            if jobs.remove(&descriptor.id).is_some() {
                self.store.delete(&descriptor.id).await?;
            }
            return Ok(());
        };

        self.store.save(&descriptor, next_run_time).await?;
        let replaced = jobs
            .insert(
                descriptor.id.clone(),
                ScheduledJob {
                    descriptor: descriptor.clone(),
                    trigger,
                    next_run_time,
                },
            )
            .is_some();
        drop(jobs);

        info!(
            backend = %self.name,
            job_id = %descriptor.id,
            name = %descriptor.name,
            next_run_time = %next_run_time,
            replaced,
            "Job scheduled"
        );
        self.wake.notify_one();
        Ok(())
    }

    /// Remove a live job
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.remove(id).is_none() {
            return Err(SchedulerError::JobNotFound {
                backend: self.name.clone(),
                id: id.to_string(),
            });
        }
        self.store.delete(id).await?;
        drop(jobs);

        info!(backend = %self.name, job_id = %id, "Job removed");
        self.wake.notify_one();
        Ok(())
    }

    /// Live jobs, soonest first
    pub async fn list(&self) -> Vec<JobInfo> {
        let in_flight = self.in_flight_ids();
        let jobs = self.jobs.read().await;
        let mut infos: Vec<JobInfo> = jobs
            .values()
            .map(|job| JobInfo {
                id: job.descriptor.id.clone(),
                name: job.descriptor.name.clone(),
                schedule_kind: job.descriptor.schedule_kind,
                handler: job.descriptor.payload.handler.clone(),
                next_run_time: job.next_run_time,
                running: in_flight.contains(&job.descriptor.id),
            })
            .collect();
        infos.sort_by(|a, b| a.next_run_time.cmp(&b.next_run_time).then(a.id.cmp(&b.id)));
        infos
    }

    /// Whether the job is live
    pub async fn contains(&self, id: &str) -> bool {
        self.jobs.read().await.contains_key(id)
    }

    /// Number of firings in progress
    pub fn running_count(&self) -> usize {
        self.lock_in_flight().len()
    }

    /// Spawn the scheduling loop; a second call is a no-op
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() || self.shutdown.is_cancelled() {
            debug!(backend = %self.name, "Backend already started or stopped");
            return;
        }
        let backend = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { backend.run_loop().await }));
    }

    /// Stop the loop, then wait up to `timeout` for in-flight firings
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!(backend = %self.name, "Backend loop ended abnormally: {}", e);
            }
        }

        self.wait_for_running(timeout).await;
        self.store.close().await;
        info!(backend = %self.name, "Backend stopped");
    }

    async fn run_loop(self: Arc<Self>) {
        info!(backend = %self.name, "Backend started");

        loop {
            let idle = self.fire_due().await;

            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                _ = self.wake.notified() => {
                    debug!(backend = %self.name, "Backend woken by job change");
                }
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!(backend = %self.name, "Backend loop exiting");
    }

    /// Fire every due job and return how long to sleep
    async fn fire_due(self: &Arc<Self>) -> Duration {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;

        let due: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| job.next_run_time <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in due {
            let Some(job) = jobs.get_mut(&id) else {
                continue;
            };
            let descriptor = job.descriptor.clone();
            let next = job
                .trigger
                .next_fire_time(Some(job.next_run_time), now)
                .map(|t| job.trigger.apply_jitter(t));

            let persisted = match next {
                Some(next_run_time) => {
                    job.next_run_time = next_run_time;
                    self.store.update_next_run(&id, next_run_time).await
                }
                None => {
                    jobs.remove(&id);
                    debug!(backend = %self.name, job_id = %id, "Trigger exhausted, job removed");
                    self.store.delete(&id).await.map(|_| ())
                }
            };
            if let Err(e) = persisted {
                error!(backend = %self.name, job_id = %id, "Failed to persist job state: {}", e);
            }

            self.dispatch(descriptor);
        }

        let soonest = jobs.values().map(|job| job.next_run_time).min();
        drop(jobs);

        match soonest {
            Some(at) => (at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.max_idle),
            None => self.max_idle,
        }
    }

    /// Spawn one firing unless the same job is still running
    fn dispatch(self: &Arc<Self>, descriptor: TaskDescriptor) {
        if !self.lock_in_flight().insert(descriptor.id.clone()) {
            info!(
                backend = %self.name,
                job_id = %descriptor.id,
                name = %descriptor.name,
                "Previous firing still running, skipping"
            );
            return;
        }

        let guard = InFlightGuard {
            backend: Arc::clone(self),
            id: descriptor.id.clone(),
        };
        let permits = Arc::clone(&self.permits);
        let runner = self.runner.clone();
        let backend_name = self.name.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            if let Err(e) = runner.run(&descriptor).await {
                error!(
                    backend = %backend_name,
                    job_id = %descriptor.id,
                    "Firing abandoned, record store unavailable: {}",
                    e
                );
            }
        });
    }

    async fn wait_for_running(&self, timeout: Duration) {
        let start = tokio::time::Instant::now();

        loop {
            let count = self.running_count();
            if count == 0 {
                break;
            }
            if start.elapsed() > timeout {
                warn!(backend = %self.name, "Timeout waiting for {} running firings", count);
                break;
            }

            debug!(backend = %self.name, "Waiting for {} running firings", count);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    fn in_flight_ids(&self) -> HashSet<String> {
        self.lock_in_flight().clone()
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears a job's in-flight mark however its firing ends
struct InFlightGuard {
    backend: Arc<Backend>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.backend.lock_in_flight().remove(&self.id);
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("max_idle", &self.max_idle)
            .finish_non_exhaustive()
    }
}
