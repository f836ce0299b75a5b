//! Crate-level error type.
//!
//! Each component has its own error enum; `PerfError` unifies them for
//! setup paths such as [`crate::optimizer::PerformanceOptimizer::from_config`].
//! The request-path APIs absorb backend failures and never return these.

use crate::cache::CacheError;
use crate::config::ConfigurationError;
use crate::pool::PoolError;
use crate::queue::QueueError;
use crate::tasks::TaskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerfError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Client pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Task manager error: {0}")]
    Task(#[from] TaskError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Component disabled: {0}")]
    Disabled(String),
}

impl PerfError {
    pub fn disabled(component: impl Into<String>) -> Self {
        Self::Disabled(component.into())
    }
}

pub type PerfResult<T> = Result<T, PerfError>;
