    use super::*;
    use crate::scheduler::types::{
        ExecutionStatus, Payload, ScheduleKind, ScheduleParams, TaskDescriptor,
        TaskExecutionRecord,
    };
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        store: TaskStore,
        _dir: TempDir,
    }

    async fn create_test_context() -> TestContext {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_records.db");
        let store = TaskStore::from_path(&path).await.unwrap();
        TestContext { store, _dir: dir }
    }

    fn hourly(name: &str) -> TaskDescriptor {
        let params: ScheduleParams = json!({"hours": 1}).as_object().cloned().unwrap();
        TaskDescriptor::new(name, ScheduleKind::Interval, params, Payload::new("noop"))
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates_by_id() {
        let ctx = create_test_context().await;
        let store = &ctx.store;

        let task = hourly("refresh").with_id("refresh-1");
        let outcome = store.upsert_tasks(&[task.clone()]).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.updated, 0);

        let task = task.with_active(false).with_task_type("maintenance");
        let outcome = store.upsert_tasks(&[task]).await.unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.updated, 1);

        let stored = store.get_task("refresh-1").await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.task_type, "maintenance");
        assert_eq!(store.count_tasks().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_matches_name_and_kind() {
        let ctx = create_test_context().await;
        let store = &ctx.store;

        store
            .upsert_tasks(&[hourly("refresh").with_id("old-id")])
            .await
            .unwrap();
        let outcome = store
            .upsert_tasks(&[hourly("refresh").with_id("new-id")])
            .await
            .unwrap();

        assert_eq!(outcome.updated, 1);
        assert_eq!(store.count_tasks().await.unwrap(), 1);
        assert!(store.get_task("old-id").await.unwrap().is_none());
        assert!(store.get_task("new-id").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_same_name_different_kind_is_distinct() {
        let ctx = create_test_context().await;
        let store = &ctx.store;

        let cron_params = json!({"hour": "0"}).as_object().cloned().unwrap();
        let cron = TaskDescriptor::new(
            "refresh",
            ScheduleKind::Cron,
            cron_params,
            Payload::new("noop"),
        );
        store.upsert_tasks(&[hourly("refresh"), cron]).await.unwrap();

        assert_eq!(store.count_tasks().await.unwrap(), 2);
        assert_eq!(store.task_ids().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_descriptor_round_trips_payload() {
        let ctx = create_test_context().await;
        let store = &ctx.store;

        let mut task = hourly("audit");
        task.payload = Payload::new("log_request")
            .with_arg("GET")
            .with_detail("path", "/v1/companies");
        store.upsert_tasks(&[task.clone()]).await.unwrap();

        let tasks = store.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0], task);
        assert_eq!(tasks[0].payload.args, vec![json!("GET")]);
        assert_eq!(tasks[0].payload.details["path"], json!("/v1/companies"));
    }

    #[tokio::test]
    async fn test_execution_lifecycle() {
        let ctx = create_test_context().await;
        let store = &ctx.store;

        let task = hourly("refresh");
        let mut record = TaskExecutionRecord::start(&task);
        {
            let mut conn = store.acquire().await.unwrap();
            TaskStore::insert_execution(&mut conn, &record).await.unwrap();
        }

        let running = store.list_executions(&task.id, 10).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].status, ExecutionStatus::Running);
        assert!(running[0].end_time.is_none());

        record.succeed(json!({"rows": 3}));
        let mut conn = store.acquire().await.unwrap();
        assert!(TaskStore::complete_execution(&mut conn, &record).await.unwrap());
        drop(conn);

        let done = store.list_executions(&task.id, 10).await.unwrap();
        assert_eq!(done[0].status, ExecutionStatus::Success);
        assert!(done[0].success);
        assert_eq!(done[0].details["result"], json!({"rows": 3}));
    }

    #[tokio::test]
    async fn test_complete_missing_execution_reports_false() {
        let ctx = create_test_context().await;
        let mut record = TaskExecutionRecord::start(&hourly("refresh"));
        record.fail("boom".to_string(), "boom".to_string());

        let mut conn = ctx.store.acquire().await.unwrap();
        assert!(!TaskStore::complete_execution(&mut conn, &record).await.unwrap());
    }

    #[tokio::test]
    async fn test_retention_deletes_and_trims() {
        let ctx = create_test_context().await;
        let store = &ctx.store;
        let task = hourly("refresh");

        let mut conn = store.acquire().await.unwrap();
        for age_days in [10, 5, 1, 0] {
            let mut record = TaskExecutionRecord::start(&task);
            record.inserted_at = Utc::now() - Duration::days(age_days);
            record.start_time = record.inserted_at;
            TaskStore::insert_execution(&mut conn, &record).await.unwrap();
        }
        drop(conn);

        let deleted = store
            .delete_executions_before(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_executions().await.unwrap(), 3);

        let trimmed = store.trim_executions(2).await.unwrap();
        assert_eq!(trimmed, 1);
        let remaining = store.list_executions(&task.id, 10).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining
            .iter()
            .all(|r| r.inserted_at > Utc::now() - Duration::days(2)));
    }

    #[tokio::test]
    async fn test_fail_interrupted_executions() {
        let ctx = create_test_context().await;
        let store = &ctx.store;
        let task = hourly("refresh");

        let mut conn = store.acquire().await.unwrap();
        let running = TaskExecutionRecord::start(&task);
        TaskStore::insert_execution(&mut conn, &running).await.unwrap();
        let mut finished = TaskExecutionRecord::start(&task);
        finished.succeed(json!(null));
        TaskStore::insert_execution(&mut conn, &finished).await.unwrap();
        drop(conn);

        assert_eq!(store.fail_interrupted_executions().await.unwrap(), 1);

        let records = store.list_executions(&task.id, 10).await.unwrap();
        let interrupted = records.iter().find(|r| r.id == running.id).unwrap();
        assert_eq!(interrupted.status, ExecutionStatus::Failed);
        assert!(!interrupted.success);
        assert!(interrupted.end_time.is_some());
        let untouched = records.iter().find(|r| r.id == finished.id).unwrap();
        assert_eq!(untouched.status, ExecutionStatus::Success);
    }
