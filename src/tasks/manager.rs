//! # Async Task Manager
//!
//! Runs user-scoped tasks off the request path and tracks their lifecycle.
//!
//! Cooperative tasks are spawned onto the current tokio runtime. Blocking
//! tasks run on the blocking pool, bounded by a semaphore sized from
//! `max_workers`. Every status change is written to the in-process index and,
//! when configured, to the durable ledger so other instances can answer
//! status queries. A task failure or panic is recorded on the task and never
//! surfaces to the submitter.
//!
//! ```rust
//! use perf_core::clock::system_clock;
//! use perf_core::config::TaskManagerConfig;
//! use perf_core::tasks::AsyncTaskManager;
//! use perf_core::TaskStatus;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let manager = AsyncTaskManager::new(TaskManagerConfig::default(), system_clock());
//! let task_id = manager
//!     .submit_task("double", "u1", |_ctx| async { Ok::<_, String>(21 * 2) })
//!     .await;
//!
//! let task = manager
//!     .wait_for_completion(task_id, Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! assert_eq!(task.status, TaskStatus::Completed);
//! assert_eq!(manager.get_task_result(task_id).await, Some(serde_json::json!(42)));
//! # });
//! ```

use super::context::TaskContext;
use super::errors::{TaskError, TaskResult};
use super::ledger::TaskLedger;
use crate::clock::SharedClock;
use crate::config::TaskManagerConfig;
use crate::logging::log_task_operation;
use crate::models::{AsyncTask, TaskStatus};
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How often a waiter re-reads the ledger for tasks run by another instance
const LEDGER_POLL_INTERVAL: Duration = Duration::from_millis(250);

type TaskOutcome = Result<serde_json::Value, String>;

/// Point-in-time counters for the task manager
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskManagerStats {
    pub tracked: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    /// Tasks submitted and not yet finished
    pub active: usize,
    pub max_workers: usize,
    pub available_workers: usize,
    pub submitted_total: u64,
    pub completed_total: u64,
    pub failed_total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskManagerHealth {
    pub healthy: bool,
    pub accepting: bool,
    pub ledger: Option<String>,
    pub ledger_healthy: Option<bool>,
    pub stats: TaskManagerStats,
}

struct ManagerInner {
    tasks: Arc<DashMap<Uuid, AsyncTask>>,
    ledger: Option<Arc<dyn TaskLedger>>,
    workers: Arc<Semaphore>,
    config: TaskManagerConfig,
    clock: SharedClock,
    active: AtomicUsize,
    idle: Notify,
    finished: Notify,
    accepting: AtomicBool,
    submitted_total: AtomicU64,
    completed_total: AtomicU64,
    failed_total: AtomicU64,
}

impl std::fmt::Debug for ManagerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTaskManager")
            .field("tracked", &self.tasks.len())
            .field("ledger", &self.ledger.as_ref().map(|l| l.provider_name()))
            .field("max_workers", &self.config.max_workers)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

/// Cheap to clone; clones share one task index and worker pool
#[derive(Debug, Clone)]
pub struct AsyncTaskManager {
    inner: Arc<ManagerInner>,
}

impl AsyncTaskManager {
    pub fn new(config: TaskManagerConfig, clock: SharedClock) -> Self {
        Self::build(config, None, clock)
    }

    /// Build a manager that mirrors every state change into `ledger`
    pub fn with_ledger(
        config: TaskManagerConfig,
        ledger: Arc<dyn TaskLedger>,
        clock: SharedClock,
    ) -> Self {
        Self::build(config, Some(ledger), clock)
    }

    fn build(
        config: TaskManagerConfig,
        ledger: Option<Arc<dyn TaskLedger>>,
        clock: SharedClock,
    ) -> Self {
        let max_workers = config.max_workers.max(1);
        Self {
            inner: Arc::new(ManagerInner {
                tasks: Arc::new(DashMap::new()),
                ledger,
                workers: Arc::new(Semaphore::new(max_workers)),
                config,
                clock,
                active: AtomicUsize::new(0),
                idle: Notify::new(),
                finished: Notify::new(),
                accepting: AtomicBool::new(true),
                submitted_total: AtomicU64::new(0),
                completed_total: AtomicU64::new(0),
                failed_total: AtomicU64::new(0),
            }),
        }
    }

    pub fn ledger(&self) -> Option<&Arc<dyn TaskLedger>> {
        self.inner.ledger.as_ref()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// Submit a cooperative task and return its id without waiting for it
    ///
    /// The task receives a [`TaskContext`] for progress reporting. Its `Ok`
    /// value is serialized to JSON as the task result; an `Err`, a panic or a
    /// result that fails to serialize marks the task `failed`.
    pub async fn submit_task<F, Fut, T, E>(&self, task_type: &str, user_id: &str, task: F) -> Uuid
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
    {
        self.submit_task_with_metadata(task_type, user_id, None, task)
            .await
    }

    pub async fn submit_task_with_metadata<F, Fut, T, E>(
        &self,
        task_type: &str,
        user_id: &str,
        metadata: Option<HashMap<String, serde_json::Value>>,
        task: F,
    ) -> Uuid
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
    {
        let task_id = match self.register(task_type, user_id, metadata).await {
            Ok(task_id) => task_id,
            Err(task_id) => return task_id,
        };

        let manager = self.clone();
        let context = TaskContext::new(task_id, self.clone());
        tokio::spawn(async move {
            manager.transition_to_running(task_id).await;

            let outcome = AssertUnwindSafe(async move { task(context).await })
                .catch_unwind()
                .await;
            let outcome = match outcome {
                Ok(Ok(value)) => serialize_result(value),
                Ok(Err(error)) => Err(error.to_string()),
                Err(panic) => Err(panic_message(panic)),
            };

            manager.finish(task_id, outcome).await;
        });

        task_id
    }

    /// Submit blocking work to run on the bounded worker pool
    ///
    /// The task stays `pending` until a worker slot is free.
    pub async fn submit_blocking_task<F, T, E>(&self, task_type: &str, user_id: &str, task: F) -> Uuid
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
    {
        let task_id = match self.register(task_type, user_id, None).await {
            Ok(task_id) => task_id,
            Err(task_id) => return task_id,
        };

        let manager = self.clone();
        tokio::spawn(async move {
            let permit = match Arc::clone(&manager.inner.workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    manager
                        .finish(task_id, Err("worker pool closed".to_string()))
                        .await;
                    return;
                }
            };

            manager.transition_to_running(task_id).await;

            let joined = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                task()
            })
            .await;

            let outcome = match joined {
                Ok(Ok(value)) => serialize_result(value),
                Ok(Err(error)) => Err(error.to_string()),
                Err(join_error) if join_error.is_panic() => {
                    Err(panic_message(join_error.into_panic()))
                }
                Err(join_error) => Err(format!("task cancelled: {join_error}")),
            };

            manager.finish(task_id, outcome).await;
        });

        task_id
    }

    /// Current record for a task, from the local index or else the ledger
    pub async fn get_task_status(&self, task_id: Uuid) -> Option<AsyncTask> {
        if let Some(task) = self.inner.tasks.get(&task_id) {
            return Some(task.clone());
        }

        let ledger = self.inner.ledger.as_ref()?;
        match ledger.get_task(task_id).await {
            Ok(task) => task,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "⚠️ Task ledger lookup failed");
                None
            }
        }
    }

    /// Result of a completed task; `None` for unknown, unfinished or failed tasks
    pub async fn get_task_result(&self, task_id: Uuid) -> Option<serde_json::Value> {
        self.get_task_status(task_id)
            .await
            .filter(|task| task.status == TaskStatus::Completed)
            .and_then(|task| task.result)
    }

    /// A user's tasks, newest first, merged across the index and the ledger
    pub async fn list_user_tasks(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Vec<AsyncTask> {
        let mut merged: HashMap<Uuid, AsyncTask> = HashMap::new();

        if let Some(ledger) = &self.inner.ledger {
            match ledger.list_user_tasks(user_id, status, limit).await {
                Ok(tasks) => {
                    merged.extend(tasks.into_iter().map(|task| (task.task_id, task)));
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "⚠️ Task ledger listing failed");
                }
            }
        }

        // Local records are fresher than the ledger copy
        for entry in self.inner.tasks.iter() {
            let task = entry.value();
            if task.user_id == user_id && status.map_or(true, |s| task.status == s) {
                merged.insert(task.task_id, task.clone());
            }
        }

        let mut tasks: Vec<AsyncTask> = merged.into_values().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        tasks
    }

    /// Drop terminal tasks that finished more than `older_than` ago from the index
    ///
    /// Ledger records are left to their own TTL.
    pub fn cleanup_completed_tasks(&self, older_than: Duration) -> usize {
        let now = self.inner.clock.now();
        let before = self.inner.tasks.len();
        self.inner
            .tasks
            .retain(|_, task| !task.is_past_retention(now, older_than));
        let removed = before.saturating_sub(self.inner.tasks.len());

        if removed > 0 {
            info!(removed = removed, "🧹 Purged finished tasks from index");
        }
        removed
    }

    /// Delete expired records from the durable ledger
    pub async fn purge_ledger(&self) -> u64 {
        let Some(ledger) = &self.inner.ledger else {
            return 0;
        };
        match ledger.purge_expired().await {
            Ok(purged) => purged,
            Err(e) => {
                warn!(ledger = ledger.provider_name(), error = %e, "⚠️ Task ledger purge failed");
                0
            }
        }
    }

    /// Purge using the configured retention window
    pub fn cleanup_expired_tasks(&self) -> usize {
        self.cleanup_completed_tasks(self.inner.config.retention())
    }

    /// Wait until a task reaches a terminal state
    pub async fn wait_for_completion(&self, task_id: Uuid, timeout: Duration) -> TaskResult<AsyncTask> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let finished = self.inner.finished.notified();

            match self.get_task_status(task_id).await {
                Some(task) if task.status.is_terminal() => return Ok(task),
                Some(_) => {}
                None => return Err(TaskError::NotFound(task_id)),
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(TaskError::WaitTimeout {
                    task_id,
                    timeout_ms: timeout.as_millis(),
                });
            }

            let wait = (deadline - now).min(LEDGER_POLL_INTERVAL);
            let _ = tokio::time::timeout(wait, finished).await;
        }
    }

    pub fn stats(&self) -> TaskManagerStats {
        let mut stats = TaskManagerStats {
            tracked: self.inner.tasks.len(),
            active: self.inner.active.load(Ordering::Acquire),
            max_workers: self.inner.config.max_workers.max(1),
            available_workers: self.inner.workers.available_permits(),
            submitted_total: self.inner.submitted_total.load(Ordering::Relaxed),
            completed_total: self.inner.completed_total.load(Ordering::Relaxed),
            failed_total: self.inner.failed_total.load(Ordering::Relaxed),
            ..Default::default()
        };

        for entry in self.inner.tasks.iter() {
            match entry.value().status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub async fn health(&self) -> TaskManagerHealth {
        let (ledger, ledger_healthy) = match &self.inner.ledger {
            Some(ledger) => {
                let healthy = ledger.health_check().await.unwrap_or(false);
                (Some(ledger.provider_name().to_string()), Some(healthy))
            }
            None => (None, None),
        };
        let accepting = self.is_accepting();

        TaskManagerHealth {
            healthy: accepting,
            accepting,
            ledger,
            ledger_healthy,
            stats: self.stats(),
        }
    }

    /// Stop accepting work and wait for running tasks
    ///
    /// Returns `true` if every task finished within `timeout`. Tasks submitted
    /// after this call are recorded as failed.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.accepting.store(false, Ordering::Release);
        info!(
            active = self.inner.active.load(Ordering::Acquire),
            "🛑 Task manager shutting down"
        );

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let idle = self.inner.idle.notified();
            if self.inner.active.load(Ordering::Acquire) == 0 {
                info!("✅ Task manager drained");
                return true;
            }
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                warn!(
                    active = self.inner.active.load(Ordering::Acquire),
                    "⚠️ Task manager shutdown timed out with tasks still running"
                );
                return false;
            }
        }
    }

    /// Record a pending task. `Err` carries the id of a task that was
    /// rejected and already recorded as failed.
    async fn register(
        &self,
        task_type: &str,
        user_id: &str,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<Uuid, Uuid> {
        let now = self.inner.clock.now();
        let mut task = AsyncTask::new(task_type, user_id, metadata, now);
        let task_id = task.task_id;
        self.inner.submitted_total.fetch_add(1, Ordering::Relaxed);

        if !self.is_accepting() {
            // Pending -> Failed is always legal
            let _ = task.mark_failed(TaskError::ShuttingDown.to_string(), now);
            self.inner.failed_total.fetch_add(1, Ordering::Relaxed);
            self.inner.tasks.insert(task_id, task.clone());
            self.persist(&task).await;
            log_task_operation("submit", &task_id, task_type, "rejected", Some("shutting down"));
            return Err(task_id);
        }

        self.inner.active.fetch_add(1, Ordering::AcqRel);
        self.inner.tasks.insert(task_id, task.clone());
        self.persist(&task).await;
        log_task_operation("submit", &task_id, task_type, task.status.as_str(), None);
        Ok(task_id)
    }

    async fn transition_to_running(&self, task_id: Uuid) {
        let now = self.inner.clock.now();
        let snapshot = self.inner.tasks.get_mut(&task_id).and_then(|mut task| {
            match task.mark_running(now) {
                Ok(()) => Some(task.clone()),
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "⚠️ Could not start task");
                    None
                }
            }
        });

        if let Some(task) = snapshot {
            debug!(task_id = %task_id, task_type = %task.task_type, "▶️ Task running");
            self.persist(&task).await;
        }
    }

    async fn finish(&self, task_id: Uuid, outcome: TaskOutcome) {
        let now = self.inner.clock.now();
        let snapshot = self.inner.tasks.get_mut(&task_id).and_then(|mut task| {
            let marked = match &outcome {
                Ok(value) => task.mark_completed(value.clone(), now),
                Err(message) => {
                    // A task that never started can still fail
                    task.mark_failed(message.clone(), now)
                }
            };
            match marked {
                Ok(()) => Some(task.clone()),
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "⚠️ Could not finish task");
                    None
                }
            }
        });

        match &outcome {
            Ok(_) => {
                self.inner.completed_total.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.inner.failed_total.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(task) = snapshot {
            log_task_operation(
                "finish",
                &task_id,
                &task.task_type,
                task.status.as_str(),
                task.error.as_deref(),
            );
            self.persist(&task).await;
        }

        self.inner.finished.notify_waiters();
        if self.inner.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }

    /// Apply `update` to a running task's index record and return the result
    pub(crate) fn update_running(
        &self,
        task_id: Uuid,
        update: impl FnOnce(&mut AsyncTask),
    ) -> Option<AsyncTask> {
        let mut task = self.inner.tasks.get_mut(&task_id)?;
        if task.status != TaskStatus::Running {
            return None;
        }
        update(task.value_mut());
        Some(task.clone())
    }

    pub(crate) async fn persist(&self, task: &AsyncTask) {
        let Some(ledger) = &self.inner.ledger else {
            return;
        };
        if let Err(e) = ledger.put_task(task, self.inner.config.ledger_ttl()).await {
            warn!(
                task_id = %task.task_id,
                status = %task.status,
                error = %e,
                "⚠️ Failed to write task to ledger"
            );
        }
    }
}

fn serialize_result<T: Serialize>(value: T) -> TaskOutcome {
    serde_json::to_value(value).map_err(|e| TaskError::Serialization(e.to_string()).to_string())
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    };
    format!("task panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::tasks::ledger::InMemoryTaskLedger;

    fn manager(max_workers: usize) -> AsyncTaskManager {
        let config = TaskManagerConfig {
            max_workers,
            ..Default::default()
        };
        AsyncTaskManager::new(config, ManualClock::starting_now().shared())
    }

    #[tokio::test]
    async fn test_submit_returns_before_task_runs() {
        let manager = manager(2);
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);

        let task_id = manager
            .submit_task("summarize", "u1", move |_ctx| async move {
                release.notified().await;
                Ok::<_, String>("done")
            })
            .await;

        let task = manager.get_task_status(task_id).await.unwrap();
        assert!(!task.status.is_terminal());
        assert_eq!(task.user_id, "u1");

        gate.notify_one();
        let task = manager
            .wait_for_completion(task_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result, Some(serde_json::json!("done")));
        assert_eq!(task.progress, 100.0);
        assert!(task.started_at.is_some());
    }

    #[tokio::test]
    async fn test_error_and_panic_mark_task_failed() {
        let manager = manager(2);

        let failing = manager
            .submit_task("grade", "u1", |_ctx| async {
                Err::<(), _>("rubric missing")
            })
            .await;
        let panicking = manager
            .submit_task("grade", "u1", |_ctx| async {
                if true {
                    panic!("index out of range");
                }
                Ok::<(), String>(())
            })
            .await;

        let failed = manager
            .wait_for_completion(failing, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("rubric missing"));
        assert_eq!(manager.get_task_result(failing).await, None);

        let panicked = manager
            .wait_for_completion(panicking, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(panicked.status, TaskStatus::Failed);
        assert!(panicked.error.unwrap().contains("index out of range"));
    }

    #[tokio::test]
    async fn test_progress_reported_through_context() {
        let manager = manager(1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let task_id = manager
            .submit_task("transcribe", "u9", move |ctx| async move {
                ctx.report_progress(40.0).await;
                ctx.set_metadata("stage", serde_json::json!("audio")).await;
                let _ = rx.await;
                Ok::<_, String>(1)
            })
            .await;

        for _ in 0..100 {
            let task = manager.get_task_status(task_id).await.unwrap();
            if task.progress > 0.0 {
                assert_eq!(task.progress, 40.0);
                assert_eq!(task.metadata.unwrap()["stage"], "audio");
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tx.send(()).unwrap();
        manager
            .wait_for_completion(task_id, Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_blocking_tasks_respect_worker_bound() {
        let manager = manager(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut ids = Vec::new();
        for _ in 0..4 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            ids.push(
                manager
                    .submit_blocking_task("ocr", "u1", move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(now)
                    })
                    .await,
            );
        }

        for id in ids {
            let task = manager
                .wait_for_completion(id, Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(task.status, TaskStatus::Completed);
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(manager.stats().available_workers, 1);
    }

    #[tokio::test]
    async fn test_status_falls_back_to_shared_ledger() {
        let clock = ManualClock::starting_now();
        let ledger = Arc::new(InMemoryTaskLedger::new(clock.shared()));
        let writer = AsyncTaskManager::with_ledger(
            TaskManagerConfig::default(),
            ledger.clone(),
            clock.shared(),
        );
        let reader =
            AsyncTaskManager::with_ledger(TaskManagerConfig::default(), ledger, clock.shared());

        let task_id = writer
            .submit_task("export", "u5", |_ctx| async { Ok::<_, String>(7) })
            .await;
        writer
            .wait_for_completion(task_id, Duration::from_secs(5))
            .await
            .unwrap();

        let seen = reader.get_task_status(task_id).await.unwrap();
        assert_eq!(seen.status, TaskStatus::Completed);
        assert_eq!(reader.get_task_result(task_id).await, Some(serde_json::json!(7)));
        assert_eq!(reader.list_user_tasks("u5", None, 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_task_is_none() {
        let manager = manager(1);
        let missing = Uuid::new_v4();
        assert!(manager.get_task_status(missing).await.is_none());
        assert!(matches!(
            manager
                .wait_for_completion(missing, Duration::from_millis(10))
                .await,
            Err(TaskError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_respects_retention() {
        let clock = ManualClock::starting_now();
        let manager = AsyncTaskManager::new(TaskManagerConfig::default(), clock.shared());

        let done = manager
            .submit_task("t", "u", |_ctx| async { Ok::<_, String>(()) })
            .await;
        manager
            .wait_for_completion(done, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(manager.cleanup_completed_tasks(Duration::from_secs(3600)), 0);
        clock.advance(Duration::from_secs(7200));
        assert_eq!(manager.cleanup_completed_tasks(Duration::from_secs(3600)), 1);
        assert!(manager.get_task_status(done).await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let manager = manager(1);
        assert!(manager.shutdown(Duration::from_secs(1)).await);

        let task_id = manager
            .submit_task("t", "u", |_ctx| async { Ok::<_, String>(()) })
            .await;
        let task = manager.get_task_status(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.unwrap().contains("shutting down"));
    }
}
