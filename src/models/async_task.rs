//! Async task record and its status machine.
//!
//! `pending -> running -> {completed | failed}`. Terminal states admit no
//! further transitions; callers that want a retry submit a new task.

use crate::tasks::errors::{TaskError, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle state of an async task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, not yet started
    Pending,
    /// Execution routine has started
    Running,
    /// Finished and produced a result
    Completed,
    /// Finished with an error or panic
    Failed,
}

impl TaskStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// User-scoped unit of fire-and-forget work tracked by the task manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncTask {
    pub task_id: Uuid,
    pub task_type: String,
    pub user_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Percentage in `[0, 100]`
    pub progress: f64,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl AsyncTask {
    /// Create a pending task record
    pub fn new(
        task_type: impl Into<String>,
        user_id: impl Into<String>,
        metadata: Option<HashMap<String, serde_json::Value>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            task_type: task_type.into(),
            user_id: user_id.into(),
            status: TaskStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            progress: 0.0,
            result: None,
            error: None,
            metadata,
        }
    }

    fn transition(&mut self, next: TaskStatus) -> TaskResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::invalid_transition(self.task_id, self.status, next));
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) -> TaskResult<()> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn mark_completed(&mut self, result: serde_json::Value, now: DateTime<Utc>) -> TaskResult<()> {
        self.transition(TaskStatus::Completed)?;
        self.progress = 100.0;
        self.result = Some(result);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> TaskResult<()> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// Clamp and record progress; ignored once terminal
    pub fn set_progress(&mut self, progress: f64) {
        if self.status.is_terminal() || progress.is_nan() {
            return;
        }
        self.progress = progress.clamp(0.0, 100.0);
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
    }

    /// Terminal and finished longer ago than `retention`
    pub fn is_past_retention(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        if !self.status.is_terminal() {
            return false;
        }
        let finished = self.completed_at.unwrap_or(self.created_at);
        now - finished > crate::clock::to_chrono(retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("in_progress".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_lifecycle_sets_timestamps_and_progress() {
        let now = Utc::now();
        let mut task = AsyncTask::new("summarize", "u1", None, now);
        assert_eq!(task.status, TaskStatus::Pending);

        task.mark_running(now).unwrap();
        task.set_progress(140.0);
        assert_eq!(task.progress, 100.0);
        task.set_progress(-3.0);
        assert_eq!(task.progress, 0.0);

        task.mark_completed(serde_json::json!(42), now).unwrap();
        assert_eq!(task.progress, 100.0);
        assert_eq!(task.result, Some(serde_json::json!(42)));
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_some());

        let err = task.mark_failed("late", now).unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { .. }));
    }

    #[test]
    fn test_retention_only_applies_to_terminal_tasks() {
        let now = Utc::now();
        let retention = Duration::from_secs(60);
        let mut task = AsyncTask::new("t", "u", None, now);
        let later = now + chrono::Duration::seconds(120);

        assert!(!task.is_past_retention(later, retention));

        task.mark_running(now).unwrap();
        task.mark_failed("boom", now).unwrap();
        assert!(task.is_past_retention(later, retention));
        assert!(!task.is_past_retention(now + chrono::Duration::seconds(30), retention));
    }
}
