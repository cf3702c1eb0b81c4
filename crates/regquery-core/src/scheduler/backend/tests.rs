    use super::*;
    use crate::scheduler::handlers::HandlerRegistry;
    use crate::scheduler::store::TaskStore;
    use crate::scheduler::types::{ExecutionStatus, Payload, ScheduleParams};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct TestContext {
        backend: Arc<Backend>,
        store: Arc<TaskStore>,
        calls: Arc<AtomicUsize>,
        dir: TempDir,
    }

    fn runner(store: Arc<TaskStore>, calls: Arc<AtomicUsize>) -> TaskRunner {
        let mut handlers = HandlerRegistry::new();
        handlers.register_fn("count", move |_| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        });
        handlers.register_fn("slow", |_| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(Value::Null)
        });
        TaskRunner::new(store, Arc::new(handlers))
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig::new().with_max_idle(1).with_max_concurrent(2)
    }

    async fn create_test_context() -> TestContext {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            TaskStore::from_path(&dir.path().join("tasks.db"))
                .await
                .unwrap(),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = Backend::open(
            "background",
            dir.path(),
            runner(store.clone(), calls.clone()),
            &config(),
        )
        .await
        .unwrap();
        TestContext {
            backend,
            store,
            calls,
            dir,
        }
    }

    fn params(value: Value) -> ScheduleParams {
        value.as_object().cloned().unwrap()
    }

    fn descriptor(kind: ScheduleKind, value: Value, handler: &str) -> TaskDescriptor {
        TaskDescriptor::new("backend_test", kind, params(value), Payload::new(handler))
    }

    #[tokio::test]
    async fn test_readd_same_id_replaces() {
        let ctx = create_test_context().await;

        let task = descriptor(ScheduleKind::Interval, json!({"hours": 1}), "count");
        ctx.backend.add(task.clone()).await.unwrap();
        let mut changed = task.clone();
        changed.schedule_params = params(json!({"minutes": 5}));
        ctx.backend.add(changed).await.unwrap();

        let jobs = ctx.backend.list().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, task.id);
        assert!(jobs[0].next_run_time <= Utc::now() + chrono::Duration::minutes(5));
    }

    #[tokio::test]
    async fn test_remove_unknown_job() {
        let ctx = create_test_context().await;

        let err = ctx.backend.remove("nope").await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::JobNotFound { ref backend, ref id } if backend == "background" && id == "nope"
        ));
    }

    #[tokio::test]
    async fn test_date_job_fires_once_and_deregisters() {
        let ctx = create_test_context().await;
        ctx.backend.start().await;

        let run_time = Utc::now() + chrono::Duration::milliseconds(300);
        let task = descriptor(
            ScheduleKind::Date,
            json!({"run_time": run_time.to_rfc3339()}),
            "count",
        );
        ctx.backend.add(task.clone()).await.unwrap();
        assert!(ctx.backend.contains(&task.id).await);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        ctx.backend.shutdown(Duration::from_secs(5)).await;

        assert_eq!(ctx.calls.load(Ordering::SeqCst), 1);
        assert!(!ctx.backend.contains(&task.id).await);
        let records = ctx.store.list_executions(&task.id, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_overlapping_firing_is_skipped() {
        let ctx = create_test_context().await;
        ctx.backend.start().await;

        // fires at ~1s and runs for 3s; the 2s and 3s slots are skipped
        let task = descriptor(ScheduleKind::Interval, json!({"seconds": 1}), "slow");
        ctx.backend.add(task.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(ctx.backend.running_count(), 1);
        let records = ctx.store.list_executions(&task.id, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ExecutionStatus::Running);

        ctx.backend.remove(&task.id).await.unwrap();
        ctx.backend.shutdown(Duration::from_secs(5)).await;
        let records = ctx.store.list_executions(&task.id, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_jobs_survive_restart() {
        let ctx = create_test_context().await;

        let task = descriptor(
            ScheduleKind::Cron,
            json!({"hour": "0", "minute": "0"}),
            "count",
        );
        ctx.backend.add(task.clone()).await.unwrap();
        let before = ctx.backend.list().await;
        ctx.backend.shutdown(Duration::from_secs(1)).await;

        let reopened = Backend::open(
            "background",
            ctx.dir.path(),
            runner(ctx.store.clone(), ctx.calls.clone()),
            &config(),
        )
        .await
        .unwrap();
        let after = reopened.list().await;

        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, task.id);
        assert_eq!(after[0].next_run_time, before[0].next_run_time);
        assert_eq!(after[0].schedule_kind, ScheduleKind::Cron);
    }

    #[tokio::test]
    async fn test_missed_firing_runs_once_after_restart() {
        let ctx = create_test_context().await;

        // persisted as due ten minutes ago, as if the process was down
        let task = descriptor(ScheduleKind::Interval, json!({"minutes": 1}), "count");
        ctx.backend
            .store
            .save(&task, Utc::now() - chrono::Duration::minutes(10))
            .await
            .unwrap();
        ctx.backend.shutdown(Duration::from_secs(1)).await;

        let reopened = Backend::open(
            "background",
            ctx.dir.path(),
            runner(ctx.store.clone(), ctx.calls.clone()),
            &config(),
        )
        .await
        .unwrap();
        reopened.start().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        reopened.shutdown(Duration::from_secs(5)).await;

        assert_eq!(ctx.calls.load(Ordering::SeqCst), 1);
        let jobs = reopened.list().await;
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].next_run_time > Utc::now());
    }

    #[tokio::test]
    async fn test_recovery_drops_jobs_with_invalid_schedule() {
        let ctx = create_test_context().await;

        let valid = descriptor(ScheduleKind::Interval, json!({"hours": 1}), "count");
        let invalid = descriptor(ScheduleKind::Interval, json!({"every": 2}), "count");
        let next = Utc::now() + chrono::Duration::hours(1);
        ctx.backend.store.save(&valid, next).await.unwrap();
        ctx.backend.store.save(&invalid, next).await.unwrap();
        ctx.backend.shutdown(Duration::from_secs(1)).await;

        let reopened = Backend::open(
            "background",
            ctx.dir.path(),
            runner(ctx.store.clone(), ctx.calls.clone()),
            &config(),
        )
        .await
        .unwrap();

        let jobs = reopened.list().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, valid.id);
        let (stored, broken) = reopened.store.load_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(broken.is_empty());
        assert_eq!(ctx.calls.load(Ordering::SeqCst), 0);
    }
