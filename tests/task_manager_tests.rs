//! Async task manager lifecycle, listing and ledger behaviour

mod common;

use common::init_test_logging;
use perf_core::clock::ManualClock;
use perf_core::config::TaskManagerConfig;
use perf_core::models::TaskStatus;
use perf_core::tasks::{AsyncTaskManager, InMemoryTaskLedger, TaskLedger};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

const WAIT: Duration = Duration::from_secs(5);

fn manager_with_ledger(clock: &ManualClock) -> (AsyncTaskManager, Arc<InMemoryTaskLedger>) {
    let ledger = Arc::new(InMemoryTaskLedger::new(clock.shared()));
    let manager = AsyncTaskManager::with_ledger(
        TaskManagerConfig::default(),
        ledger.clone(),
        clock.shared(),
    );
    (manager, ledger)
}

#[tokio::test]
async fn test_many_tasks_complete_independently() {
    init_test_logging();
    let manager = AsyncTaskManager::new(TaskManagerConfig::default(), ManualClock::starting_now().shared());

    let mut ids = Vec::new();
    for n in 0..25u32 {
        ids.push(
            manager
                .submit_task("score", "u1", move |_ctx| async move {
                    if n % 5 == 0 {
                        Err(format!("bad submission {n}"))
                    } else {
                        Ok(n * 2)
                    }
                })
                .await,
        );
    }

    for (n, id) in ids.iter().enumerate() {
        let task = manager.wait_for_completion(*id, WAIT).await.unwrap();
        if n % 5 == 0 {
            assert_eq!(task.status, TaskStatus::Failed);
        } else {
            assert_eq!(task.result, Some(json!(n * 2)));
        }
    }

    let stats = manager.stats();
    assert_eq!(stats.submitted_total, 25);
    assert_eq!(stats.completed_total, 20);
    assert_eq!(stats.failed_total, 5);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn test_list_user_tasks_filters_by_user_and_status() {
    let clock = ManualClock::starting_now();
    let (manager, _ledger) = manager_with_ledger(&clock);

    let ok = manager
        .submit_task("export", "alice", |_ctx| async { Ok::<_, String>("csv") })
        .await;
    manager.wait_for_completion(ok, WAIT).await.unwrap();
    clock.advance(Duration::from_secs(1));

    let bad = manager
        .submit_task("export", "alice", |_ctx| async { Err::<(), _>("disk full") })
        .await;
    manager.wait_for_completion(bad, WAIT).await.unwrap();

    manager
        .submit_task("export", "bob", |_ctx| async { Ok::<_, String>(()) })
        .await;

    let all = manager.list_user_tasks("alice", None, 10).await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].task_id, bad, "newest first");

    let failed = manager
        .list_user_tasks("alice", Some(TaskStatus::Failed), 10)
        .await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error.as_deref(), Some("disk full"));

    assert_eq!(manager.list_user_tasks("alice", None, 1).await.len(), 1);
    assert!(manager.list_user_tasks("carol", None, 10).await.is_empty());
}

#[tokio::test]
async fn test_metadata_is_recorded_at_submission() {
    let manager = AsyncTaskManager::new(TaskManagerConfig::default(), ManualClock::starting_now().shared());
    let metadata = HashMap::from([("course".to_string(), json!("cs101"))]);

    let id = manager
        .submit_task_with_metadata("summarize", "u1", Some(metadata), |ctx| async move {
            ctx.set_metadata("words", json!(420)).await;
            Ok::<_, String>(())
        })
        .await;

    let task = manager.wait_for_completion(id, WAIT).await.unwrap();
    let metadata = task.metadata.unwrap();
    assert_eq!(metadata["course"], "cs101");
    assert_eq!(metadata["words"], 420);
}

#[tokio::test]
async fn test_unreachable_ledger_does_not_fail_tasks() {
    let clock = ManualClock::starting_now();
    let (manager, ledger) = manager_with_ledger(&clock);
    ledger.set_available(false);

    let id = manager
        .submit_task("grade", "u1", |_ctx| async { Ok::<_, String>(3) })
        .await;
    let task = manager.wait_for_completion(id, WAIT).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(ledger.is_empty());

    let health = manager.health().await;
    assert!(health.healthy);
    assert_eq!(health.ledger_healthy, Some(false));
}

#[tokio::test]
async fn test_ledger_records_expire_and_purge() {
    let clock = ManualClock::starting_now();
    let (manager, ledger) = manager_with_ledger(&clock);

    let id = manager
        .submit_task("grade", "u1", |_ctx| async { Ok::<_, String>(()) })
        .await;
    manager.wait_for_completion(id, WAIT).await.unwrap();
    assert_eq!(ledger.len(), 1);

    clock.advance(TaskManagerConfig::default().ledger_ttl() + Duration::from_secs(1));
    assert_eq!(manager.purge_ledger().await, 1);
    assert!(ledger.get_task(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_waits_for_running_tasks() {
    let manager = AsyncTaskManager::new(TaskManagerConfig::default(), ManualClock::starting_now().shared());
    let (tx, rx) = oneshot::channel::<()>();

    let id = manager
        .submit_task("transcode", "u1", move |_ctx| async move {
            let _ = rx.await;
            Ok::<_, String>(())
        })
        .await;

    assert!(!manager.shutdown(Duration::from_millis(50)).await);
    assert!(!manager.is_accepting());

    tx.send(()).unwrap();
    assert!(manager.shutdown(WAIT).await);
    assert_eq!(
        manager.get_task_status(id).await.unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn test_wait_times_out_for_slow_task() {
    let manager = AsyncTaskManager::new(TaskManagerConfig::default(), ManualClock::starting_now().shared());
    let (tx, rx) = oneshot::channel::<()>();

    let id = manager
        .submit_task("slow", "u1", move |_ctx| async move {
            let _ = rx.await;
            Ok::<_, String>(())
        })
        .await;

    assert!(manager
        .wait_for_completion(id, Duration::from_millis(30))
        .await
        .is_err());
    tx.send(()).unwrap();
    assert!(manager.wait_for_completion(id, WAIT).await.is_ok());
}

#[tokio::test]
async fn test_blocking_task_panic_is_recorded() {
    let manager = AsyncTaskManager::new(TaskManagerConfig::default(), ManualClock::starting_now().shared());

    let id = manager
        .submit_blocking_task("ocr", "u1", || -> Result<u8, String> {
            panic!("corrupt image header");
        })
        .await;

    let task = manager.wait_for_completion(id, WAIT).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("corrupt image header"));
    assert_eq!(manager.stats().available_workers, TaskManagerConfig::default().max_workers);
}

#[tokio::test]
async fn test_progress_is_visible_to_other_instances() {
    let clock = ManualClock::starting_now();
    let (local, ledger) = manager_with_ledger(&clock);
    let remote = AsyncTaskManager::with_ledger(TaskManagerConfig::default(), ledger.clone(), clock.shared());
    let (reported_tx, reported_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let id = local
        .submit_task("transcribe", "u1", move |ctx| async move {
            ctx.report_progress(30.0).await;
            ctx.set_metadata("stage", json!("audio")).await;
            // Below the write step; stays local
            ctx.report_progress(35.0).await;
            reported_tx.send(()).ok();
            release_rx.await.ok();
            Ok::<_, String>(())
        })
        .await;
    reported_rx.await.unwrap();

    let seen = remote.get_task_status(id).await.unwrap();
    assert_eq!(seen.status, TaskStatus::Running);
    assert_eq!(seen.progress, 30.0);
    assert_eq!(seen.metadata.unwrap()["stage"], "audio");
    assert_eq!(local.get_task_status(id).await.unwrap().progress, 35.0);

    release_tx.send(()).unwrap();
    local.wait_for_completion(id, WAIT).await.unwrap();
    let finished = remote.get_task_status(id).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.progress, 100.0);
}

#[tokio::test]
async fn test_task_result_comes_from_captured_argument() {
    let manager = AsyncTaskManager::new(TaskManagerConfig::default(), ManualClock::starting_now().shared());
    let x: i64 = 21;

    let id = manager
        .submit_task("double", "u1", move |_ctx| async move { Ok::<_, String>(x * 2) })
        .await;

    let task = manager.wait_for_completion(id, WAIT).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(manager.get_task_result(id).await, Some(json!(42)));
}
