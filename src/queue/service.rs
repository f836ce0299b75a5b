//! Transport abstraction for the background queue.
//!
//! A transport offers at-least-once delivery with a visibility timeout: a
//! received message stays hidden until it is deleted or the timeout lapses,
//! after which it is delivered again with a higher delivery count.

use super::errors::QueueResult;
use crate::models::QueueMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Transport-assigned message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque token required to acknowledge one delivery of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ReceiptHandle {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ReceiptHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ReceiptHandle {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One delivery of a queued message
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message: QueueMessage,
    pub receipt: ReceiptHandle,
    pub message_id: MessageId,
    /// Times this message has been handed out, including this delivery
    pub delivery_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

#[async_trait]
pub trait MessageQueueService: Send + Sync + fmt::Debug {
    /// Create the queue if it does not exist
    async fn ensure_queue(&self, queue_name: &str) -> QueueResult<()>;

    /// Enqueue a message, invisible to receivers until `delay` has passed
    async fn send_message(
        &self,
        queue_name: &str,
        message: &QueueMessage,
        delay: Duration,
    ) -> QueueResult<MessageId>;

    /// Receive up to `max_messages`, waiting at most `wait` for the first one
    ///
    /// Messages whose body cannot be decoded are moved aside by the transport
    /// and never returned.
    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> QueueResult<Vec<ReceivedMessage>>;

    /// Acknowledge a delivery; the message will not be delivered again
    async fn delete_message(&self, queue_name: &str, receipt: &ReceiptHandle) -> QueueResult<()>;

    /// Move a message to the queue's dead-letter archive
    async fn archive_message(&self, queue_name: &str, receipt: &ReceiptHandle) -> QueueResult<()>;

    async fn health_check(&self) -> QueueResult<bool>;

    fn provider_name(&self) -> &'static str;
}
