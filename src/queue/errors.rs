//! # Background Queue Error Types
//!
//! Structured errors for queue transports and handler dispatch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Invalid queue name: {queue_name}: {reason}")]
    InvalidQueueName { queue_name: String, reason: String },

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("No handler registered for task type: {task_type}")]
    UnregisteredTaskType { task_type: String },

    #[error("Handler already registered for task type: {task_type}")]
    DuplicateHandler { task_type: String },

    #[error("Queue backend unavailable: {message}")]
    Unavailable { message: String },
}

impl QueueError {
    pub fn database_connection(message: impl Into<String>) -> Self {
        Self::DatabaseConnection {
            message: message.into(),
        }
    }

    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    pub fn invalid_queue_name(queue_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQueueName {
            queue_name: queue_name.into(),
            reason: reason.into(),
        }
    }

    pub fn unregistered(task_type: impl Into<String>) -> Self {
        Self::UnregisteredTaskType {
            task_type: task_type.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                QueueError::unavailable(err.to_string())
            }
            _ => QueueError::database_connection(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() {
            QueueError::message_deserialization(err.to_string())
        } else {
            QueueError::message_serialization(err.to_string())
        }
    }
}

impl From<pgmq::errors::PgmqError> for QueueError {
    fn from(err: pgmq::errors::PgmqError) -> Self {
        QueueError::queue_operation("unknown", "pgmq", err.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_creation() {
        let err = QueueError::queue_operation("background_tasks", "send", "boom");
        assert!(matches!(err, QueueError::QueueOperation { .. }));
        assert_eq!(
            err.to_string(),
            "Queue operation failed: background_tasks: send: boom"
        );

        let err = QueueError::unregistered("summarize");
        assert!(err.to_string().contains("summarize"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: QueueError = json_err.into();
        assert!(matches!(err, QueueError::MessageDeserialization { .. }));
    }
}
