//! Durable task ledger.
//!
//! The in-process task index is a local accelerator; the ledger is what other
//! process instances consult when asked about a task they did not run.

use super::errors::TaskResult;
use crate::clock::{to_chrono, SharedClock};
use crate::models::{AsyncTask, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait TaskLedger: Send + Sync + std::fmt::Debug {
    /// Insert or replace a task record, expiring `ttl` from now
    async fn put_task(&self, task: &AsyncTask, ttl: Duration) -> TaskResult<()>;

    async fn get_task(&self, task_id: Uuid) -> TaskResult<Option<AsyncTask>>;

    /// Unexpired tasks for a user, newest first
    async fn list_user_tasks(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> TaskResult<Vec<AsyncTask>>;

    /// Delete records past their TTL, returning how many were removed
    async fn purge_expired(&self) -> TaskResult<u64> {
        Ok(0)
    }

    async fn health_check(&self) -> TaskResult<bool>;

    fn provider_name(&self) -> &'static str;
}

/// Ledger kept in process memory, shareable between manager instances in tests
#[derive(Debug, Clone)]
pub struct InMemoryTaskLedger {
    records: Arc<DashMap<Uuid, (AsyncTask, DateTime<Utc>)>>,
    available: Arc<AtomicBool>,
    clock: SharedClock,
}

impl InMemoryTaskLedger {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
            clock,
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn ensure_available(&self) -> TaskResult<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(super::errors::TaskError::ledger(
                "connect",
                "in-memory ledger is offline",
            ))
        }
    }
}

#[async_trait]
impl TaskLedger for InMemoryTaskLedger {
    async fn put_task(&self, task: &AsyncTask, ttl: Duration) -> TaskResult<()> {
        self.ensure_available()?;
        let expires_at = self.clock.now() + to_chrono(ttl);
        self.records.insert(task.task_id, (task.clone(), expires_at));
        Ok(())
    }

    async fn get_task(&self, task_id: Uuid) -> TaskResult<Option<AsyncTask>> {
        self.ensure_available()?;
        let now = self.clock.now();
        Ok(self
            .records
            .get(&task_id)
            .filter(|record| record.1 > now)
            .map(|record| record.0.clone()))
    }

    async fn list_user_tasks(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> TaskResult<Vec<AsyncTask>> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut tasks: Vec<AsyncTask> = self
            .records
            .iter()
            .filter(|record| record.1 > now)
            .map(|record| record.0.clone())
            .filter(|task| task.user_id == user_id)
            .filter(|task| status.map_or(true, |s| task.status == s))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn purge_expired(&self) -> TaskResult<u64> {
        self.ensure_available()?;
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, record| record.1 > now);
        Ok(before.saturating_sub(self.records.len()) as u64)
    }

    async fn health_check(&self) -> TaskResult<bool> {
        Ok(self.available.load(Ordering::Acquire))
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
