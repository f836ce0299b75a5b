//! In-process queue transport with visibility timeouts and delayed delivery.
//!
//! Used by tests and single-process deployments. Visibility and delay are
//! measured on the injected clock; long-poll waiting uses tokio time.

use crate::clock::{to_chrono, SharedClock};
use crate::models::QueueMessage;
use crate::queue::errors::{QueueError, QueueResult};
use crate::queue::service::{MessageId, MessageQueueService, ReceiptHandle, ReceivedMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
struct StoredMessage {
    body: serde_json::Value,
    visible_at: DateTime<Utc>,
    read_count: u32,
    enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: i64,
    messages: BTreeMap<i64, StoredMessage>,
    archive: Vec<(i64, serde_json::Value)>,
}

#[derive(Debug, Clone)]
pub struct InMemoryMessageQueue {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
    available: Arc<AtomicBool>,
    clock: SharedClock,
}

impl InMemoryMessageQueue {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            clock,
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Messages still in the queue, visible or not
    pub fn depth(&self, queue_name: &str) -> usize {
        self.queues
            .lock()
            .get(queue_name)
            .map_or(0, |queue| queue.messages.len())
    }

    /// Bodies moved to the archive, oldest first
    pub fn archived(&self, queue_name: &str) -> Vec<serde_json::Value> {
        self.queues
            .lock()
            .get(queue_name)
            .map(|queue| queue.archive.iter().map(|(_, body)| body.clone()).collect())
            .unwrap_or_default()
    }

    /// Enqueue an arbitrary JSON body, bypassing message encoding
    pub fn send_raw(&self, queue_name: &str, body: serde_json::Value) -> QueueResult<MessageId> {
        let now = self.clock.now();
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::queue_not_found(queue_name))?;
        Ok(Self::push(queue, body, now, now))
    }

    fn push(
        queue: &mut QueueState,
        body: serde_json::Value,
        enqueued_at: DateTime<Utc>,
        visible_at: DateTime<Utc>,
    ) -> MessageId {
        queue.next_id += 1;
        let id = queue.next_id;
        queue.messages.insert(
            id,
            StoredMessage {
                body,
                visible_at,
                read_count: 0,
                enqueued_at,
            },
        );
        MessageId::from(id)
    }

    fn ensure_available(&self) -> QueueResult<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(QueueError::unavailable("in-memory queue is offline"))
        }
    }

    fn parse_receipt(receipt: &ReceiptHandle) -> QueueResult<i64> {
        receipt
            .as_str()
            .parse()
            .map_err(|_| QueueError::InvalidReceipt(receipt.to_string()))
    }

    fn take_visible(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        let now = self.clock.now();
        let hidden_until = now + to_chrono(visibility_timeout);
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::queue_not_found(queue_name))?;

        let visible: Vec<i64> = queue
            .messages
            .iter()
            .filter(|(_, stored)| stored.visible_at <= now)
            .map(|(id, _)| *id)
            .take(max_messages)
            .collect();

        let mut received = Vec::with_capacity(visible.len());
        for id in visible {
            let Some(stored) = queue.messages.get_mut(&id) else {
                continue;
            };
            stored.read_count += 1;
            stored.visible_at = hidden_until;

            match QueueMessage::from_json(stored.body.clone()) {
                Ok(mut message) => {
                    message.retry_count = stored.read_count - 1;
                    received.push(ReceivedMessage {
                        message,
                        receipt: ReceiptHandle::from(id),
                        message_id: MessageId::from(id),
                        delivery_count: stored.read_count,
                        enqueued_at: stored.enqueued_at,
                    });
                }
                Err(e) => {
                    warn!(
                        queue = %queue_name,
                        message_id = id,
                        error = %e,
                        "☠️ Undecodable message moved to archive"
                    );
                    if let Some(poison) = queue.messages.remove(&id) {
                        queue.archive.push((id, poison.body));
                    }
                }
            }
        }
        Ok(received)
    }
}

#[async_trait]
impl MessageQueueService for InMemoryMessageQueue {
    async fn ensure_queue(&self, queue_name: &str) -> QueueResult<()> {
        self.ensure_available()?;
        self.queues.lock().entry(queue_name.to_string()).or_default();
        Ok(())
    }

    async fn send_message(
        &self,
        queue_name: &str,
        message: &QueueMessage,
        delay: Duration,
    ) -> QueueResult<MessageId> {
        self.ensure_available()?;
        let body = serde_json::to_value(message)
            .map_err(|e| QueueError::message_serialization(e.to_string()))?;
        let now = self.clock.now();
        let visible_at = now + to_chrono(delay);

        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::queue_not_found(queue_name))?;
        let id = Self::push(queue, body, now, visible_at);
        debug!(queue = %queue_name, message_id = %id, "📤 Message enqueued");
        Ok(id)
    }

    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        self.ensure_available()?;
        if max_messages == 0 {
            return Ok(Vec::new());
        }

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let received = self.take_visible(queue_name, max_messages, visibility_timeout)?;
            let now = tokio::time::Instant::now();
            if !received.is_empty() || now >= deadline {
                return Ok(received);
            }
            tokio::time::sleep((deadline - now).min(POLL_INTERVAL)).await;
        }
    }

    async fn delete_message(&self, queue_name: &str, receipt: &ReceiptHandle) -> QueueResult<()> {
        self.ensure_available()?;
        let id = Self::parse_receipt(receipt)?;
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::queue_not_found(queue_name))?;
        queue.messages.remove(&id);
        Ok(())
    }

    async fn archive_message(&self, queue_name: &str, receipt: &ReceiptHandle) -> QueueResult<()> {
        self.ensure_available()?;
        let id = Self::parse_receipt(receipt)?;
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::queue_not_found(queue_name))?;
        if let Some(stored) = queue.messages.remove(&id) {
            queue.archive.push((id, stored.body));
        }
        Ok(())
    }

    async fn health_check(&self) -> QueueResult<bool> {
        Ok(self.available.load(Ordering::Acquire))
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
