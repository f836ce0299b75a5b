//! # Data Model
//!
//! Records owned by the performance layer: cache entries, pooled client
//! handles, async task records and background queue messages.

pub mod async_task;
pub mod cache_entry;
pub mod client_handle;
pub mod queue_message;

pub use async_task::{AsyncTask, TaskStatus};
pub use cache_entry::CacheEntry;
pub use client_handle::ClientHandle;
pub use queue_message::QueueMessage;
