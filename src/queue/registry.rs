//! # Background Handler Registry
//!
//! Maps a message's `task_type` to the handler that processes it. The
//! registry is assembled once at startup and then shared read-only between
//! workers; an unknown task type is reported, never guessed at.
//!
//! ```rust
//! use perf_core::queue::{HandlerOutcome, HandlerRegistry};
//!
//! let registry = HandlerRegistry::builder()
//!     .register_fn("generate_quiz", |message| async move {
//!         let _topic = message.data("topic");
//!         Ok(HandlerOutcome::Completed)
//!     })
//!     .unwrap()
//!     .build();
//!
//! assert!(registry.contains("generate_quiz"));
//! ```

use super::errors::{QueueError, QueueResult};
use crate::models::QueueMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// What a handler decided about the message it was given
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Work is done; the message is acknowledged
    Completed,
    /// Leave the message for redelivery after the visibility timeout
    Retry { reason: String },
}

impl HandlerOutcome {
    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retry {
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Process one message; an `Err` is treated like [`HandlerOutcome::Retry`]
    async fn handle(&self, message: &QueueMessage) -> anyhow::Result<HandlerOutcome>;
}

/// Adapter turning an async closure into a [`TaskHandler`]
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(QueueMessage) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<HandlerOutcome>> + Send,
{
    async fn handle(&self, message: &QueueMessage) -> anyhow::Result<HandlerOutcome> {
        (self.0)(message.clone()).await
    }
}

/// Immutable `task_type -> handler` table
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Handler for `task_type`
    pub fn resolve(&self, task_type: &str) -> QueueResult<Arc<dyn TaskHandler>> {
        self.handlers
            .get(task_type)
            .cloned()
            .ok_or_else(|| QueueError::unregistered(task_type))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered task types, sorted
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistryBuilder {
    pub fn register(
        mut self,
        task_type: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> QueueResult<Self> {
        let task_type = task_type.into();
        if self.handlers.contains_key(&task_type) {
            return Err(QueueError::DuplicateHandler { task_type });
        }
        debug!(task_type = %task_type, "📝 Registered background handler");
        self.handlers.insert(task_type, handler);
        Ok(self)
    }

    pub fn register_fn<F, Fut>(self, task_type: impl Into<String>, f: F) -> QueueResult<Self>
    where
        F: Fn(QueueMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HandlerOutcome>> + Send + 'static,
    {
        self.register(task_type, Arc::new(FnHandler::new(f)))
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}
