//! # Background Task Queue
//!
//! Durable, decoupled dispatch of work through a message queue, with an
//! explicit `task_type -> handler` registry and at-least-once delivery.

pub mod background;
pub mod errors;
pub mod providers;
pub mod registry;
pub mod service;

pub use background::{BackgroundTaskQueue, QueueStats};
pub use errors::{QueueError, QueueResult};
pub use providers::{InMemoryMessageQueue, PgmqMessageQueue};
pub use registry::{FnHandler, HandlerOutcome, HandlerRegistry, HandlerRegistryBuilder, TaskHandler};
pub use service::{MessageId, MessageQueueService, ReceiptHandle, ReceivedMessage};
