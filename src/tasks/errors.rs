//! # Task Manager Error Types

use crate::models::TaskStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Invalid task transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Task ledger error: {operation}: {message}")]
    Ledger { operation: String, message: String },

    #[error("Task result serialization error: {0}")]
    Serialization(String),

    #[error("Task manager is shutting down")]
    ShuttingDown,

    #[error("Timed out after {timeout_ms}ms waiting for task {task_id}")]
    WaitTimeout { task_id: Uuid, timeout_ms: u128 },
}

impl TaskError {
    pub fn invalid_transition(task_id: Uuid, from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidTransition { task_id, from, to }
    }

    pub fn ledger(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ledger {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        TaskError::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for TaskError {
    fn from(err: sqlx::Error) -> Self {
        TaskError::ledger("database", err.to_string())
    }
}

pub type TaskResult<T> = Result<T, TaskError>;
