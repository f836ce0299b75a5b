//! # Background Task Queue
//!
//! Durable dispatch of longer-running work through a [`MessageQueueService`].
//!
//! A message is deleted only after its handler reports success. Any other
//! outcome (an error, a retry request, a panic, an unregistered task type)
//! leaves the message for the transport to redeliver once its visibility
//! timeout lapses. Messages whose delivery count has reached `max_retries`
//! are archived instead of being handed out again.

use super::errors::QueueResult;
use super::registry::{HandlerOutcome, HandlerRegistry};
use super::service::{MessageId, MessageQueueService, ReceivedMessage};
use crate::clock::SharedClock;
use crate::config::QueueConfig;
use crate::logging::log_queue_operation;
use crate::models::QueueMessage;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OnceCell};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Pause after a failed receive before the worker polls again
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Pause after a batch that deleted nothing
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub transport: String,
    pub enqueued: u64,
    pub enqueue_failures: u64,
    pub received: u64,
    /// Handled successfully and deleted
    pub processed: u64,
    /// Handler failures, including unregistered task types
    pub failed: u64,
    pub dead_lettered: u64,
    pub registered_task_types: Vec<String>,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    enqueue_failures: AtomicU64,
    received: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug)]
struct QueueInner {
    transport: Arc<dyn MessageQueueService>,
    registry: HandlerRegistry,
    config: QueueConfig,
    clock: SharedClock,
    ready: OnceCell<()>,
    counters: Counters,
}

enum Disposition {
    Completed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct BackgroundTaskQueue {
    inner: Arc<QueueInner>,
}

impl BackgroundTaskQueue {
    pub fn new(
        transport: Arc<dyn MessageQueueService>,
        registry: HandlerRegistry,
        config: QueueConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                transport,
                registry,
                config,
                clock,
                ready: OnceCell::new(),
                counters: Counters::default(),
            }),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.inner.config.queue_name
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    async fn ensure_queue(&self) -> QueueResult<()> {
        self.inner
            .ready
            .get_or_try_init(|| async {
                self.inner
                    .transport
                    .ensure_queue(&self.inner.config.queue_name)
                    .await
            })
            .await
            .map(|_| ())
    }

    /// Hand a unit of work to the queue
    ///
    /// Returns `None` if the transport refused it; the failure is logged.
    pub async fn enqueue_task(
        &self,
        task_type: &str,
        user_id: &str,
        task_data: HashMap<String, serde_json::Value>,
        delay: Duration,
    ) -> Option<MessageId> {
        let message = QueueMessage::new(task_type, user_id, task_data, self.inner.clock.now());
        let queue_name = self.queue_name();

        let sent = match self.ensure_queue().await {
            Ok(()) => {
                self.inner
                    .transport
                    .send_message(queue_name, &message, delay)
                    .await
            }
            Err(e) => Err(e),
        };

        match sent {
            Ok(message_id) => {
                self.inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                log_queue_operation(
                    "enqueue",
                    queue_name,
                    Some(message_id.as_str()),
                    Some(task_type),
                    "sent",
                );
                Some(message_id)
            }
            Err(e) => {
                self.inner
                    .counters
                    .enqueue_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    queue = %queue_name,
                    task_type = %task_type,
                    user_id = %user_id,
                    error = %e,
                    "⚠️ Failed to enqueue background task"
                );
                None
            }
        }
    }

    /// Receive one batch, long-polling up to the configured wait
    ///
    /// Returns the number of messages handled successfully and deleted.
    pub async fn process_queue_messages(&self, max_messages: usize) -> usize {
        self.process_queue_messages_with_wait(max_messages, self.inner.config.poll_wait())
            .await
    }

    pub async fn process_queue_messages_with_wait(&self, max_messages: usize, wait: Duration) -> usize {
        let batch = self.receive_batch(max_messages, wait).await;
        self.handle_batch(batch).await
    }

    async fn receive_batch(&self, max_messages: usize, wait: Duration) -> Vec<ReceivedMessage> {
        let queue_name = self.queue_name();
        if let Err(e) = self.ensure_queue().await {
            warn!(queue = %queue_name, error = %e, "⚠️ Queue unavailable");
            return Vec::new();
        }

        match self
            .inner
            .transport
            .receive_messages(
                queue_name,
                max_messages,
                self.inner.config.visibility_timeout(),
                wait,
            )
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!(queue = %queue_name, error = %e, "⚠️ Failed to receive messages");
                Vec::new()
            }
        }
    }

    /// Dispatch a received batch and acknowledge what succeeded
    async fn handle_batch(&self, batch: Vec<ReceivedMessage>) -> usize {
        let queue_name = self.queue_name();
        if batch.is_empty() {
            return 0;
        }
        self.inner
            .counters
            .received
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        debug!(queue = %queue_name, count = batch.len(), "📨 Received batch");

        let mut handlers = JoinSet::new();
        for received in batch {
            if self.exceeds_retry_limit(&received) {
                self.dead_letter(&received).await;
                continue;
            }

            let registry = self.inner.registry.clone();
            handlers.spawn(async move {
                let disposition = dispatch(&registry, &received.message).await;
                (received, disposition)
            });
        }

        let mut deleted = 0;
        while let Some(joined) = handlers.join_next().await {
            let (received, disposition) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    // dispatch catches handler panics, so this is runtime cancellation
                    error!(queue = %queue_name, error = %e, "❌ Handler task aborted");
                    self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            match disposition {
                Disposition::Completed => {
                    if self.acknowledge(&received).await {
                        deleted += 1;
                    }
                }
                Disposition::Failed(reason) => {
                    self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        queue = %queue_name,
                        message_id = %received.message_id,
                        task_type = %received.message.task_type,
                        retry_count = received.message.retry_count,
                        reason = %reason,
                        "⚠️ Background handler failed; message left for redelivery"
                    );
                }
            }
        }
        deleted
    }

    /// Poll in a loop until `shutdown` flips to `true`
    pub fn spawn_worker(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            info!(queue = %queue.queue_name(), "🚀 Background queue worker started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let batch_size = queue.inner.config.batch_size;
                let poll_wait = queue.inner.config.poll_wait();
                // Shutdown may interrupt the long poll; a received batch always runs to completion
                let batch = tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    batch = queue.receive_batch(batch_size, poll_wait) => batch,
                };
                let received = batch.len();
                let handled = queue.handle_batch(batch).await;
                if received > 0 && *shutdown.borrow() {
                    debug!(queue = %queue.queue_name(), handled = handled, "In-flight batch drained before shutdown");
                }
                if handled > 0 {
                    continue;
                }

                let pause = if queue.health_check().await {
                    IDLE_POLL_INTERVAL
                } else {
                    RECEIVE_ERROR_BACKOFF
                };
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(pause) => {}
                }
            }
            info!(queue = %queue.queue_name(), "🛑 Background queue worker stopped");
        })
    }

    pub fn stats(&self) -> QueueStats {
        let counters = &self.inner.counters;
        QueueStats {
            queue_name: self.queue_name().to_string(),
            transport: self.inner.transport.provider_name().to_string(),
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            enqueue_failures: counters.enqueue_failures.load(Ordering::Relaxed),
            received: counters.received.load(Ordering::Relaxed),
            processed: counters.processed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            dead_lettered: counters.dead_lettered.load(Ordering::Relaxed),
            registered_task_types: self.inner.registry.task_types(),
        }
    }

    pub async fn health_check(&self) -> bool {
        self.inner.transport.health_check().await.unwrap_or(false)
    }

    fn exceeds_retry_limit(&self, received: &ReceivedMessage) -> bool {
        let max_retries = self.inner.config.max_retries;
        max_retries > 0 && received.message.retry_count >= max_retries
    }

    async fn acknowledge(&self, received: &ReceivedMessage) -> bool {
        let queue_name = self.queue_name();
        match self
            .inner
            .transport
            .delete_message(queue_name, &received.receipt)
            .await
        {
            Ok(()) => {
                self.inner.counters.processed.fetch_add(1, Ordering::Relaxed);
                log_queue_operation(
                    "process",
                    queue_name,
                    Some(received.message_id.as_str()),
                    Some(&received.message.task_type),
                    "completed",
                );
                true
            }
            Err(e) => {
                // The handler ran; redelivery will run it again
                warn!(
                    queue = %queue_name,
                    message_id = %received.message_id,
                    error = %e,
                    "⚠️ Failed to delete handled message"
                );
                false
            }
        }
    }

    async fn dead_letter(&self, received: &ReceivedMessage) {
        let queue_name = self.queue_name();
        match self
            .inner
            .transport
            .archive_message(queue_name, &received.receipt)
            .await
        {
            Ok(()) => {
                self.inner
                    .counters
                    .dead_lettered
                    .fetch_add(1, Ordering::Relaxed);
                error!(
                    queue = %queue_name,
                    message_id = %received.message_id,
                    task_type = %received.message.task_type,
                    retry_count = received.message.retry_count,
                    "☠️ Retry limit reached; message archived"
                );
            }
            Err(e) => {
                warn!(
                    queue = %queue_name,
                    message_id = %received.message_id,
                    error = %e,
                    "⚠️ Failed to archive message past its retry limit"
                );
            }
        }
    }
}

async fn dispatch(registry: &HandlerRegistry, message: &QueueMessage) -> Disposition {
    let handler = match registry.resolve(&message.task_type) {
        Ok(handler) => handler,
        Err(e) => return Disposition::Failed(e.to_string()),
    };

    match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
        Ok(Ok(HandlerOutcome::Completed)) => Disposition::Completed,
        Ok(Ok(HandlerOutcome::Retry { reason })) => Disposition::Failed(reason),
        Ok(Err(e)) => Disposition::Failed(format!("{e:#}")),
        Err(_) => Disposition::Failed("handler panicked".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::queue::providers::InMemoryMessageQueue;

    fn config(max_retries: u32) -> QueueConfig {
        QueueConfig {
            queue_name: "test_jobs".to_string(),
            max_retries,
            visibility_timeout_seconds: 30,
            ..Default::default()
        }
    }

    fn registry() -> HandlerRegistry {
        HandlerRegistry::builder()
            .register_fn("ok", |_| async { Ok(HandlerOutcome::Completed) })
            .unwrap()
            .register_fn("boom", |_| async { Err(anyhow::anyhow!("handler exploded")) })
            .unwrap()
            .build()
    }

    #[tokio::test]
    async fn test_success_deletes_and_failure_keeps() {
        let clock = ManualClock::starting_now();
        let transport = Arc::new(InMemoryMessageQueue::new(clock.shared()));
        let queue = BackgroundTaskQueue::new(transport.clone(), registry(), config(0), clock.shared());

        assert!(queue.enqueue_task("ok", "u1", HashMap::new(), Duration::ZERO).await.is_some());
        assert!(queue.enqueue_task("boom", "u1", HashMap::new(), Duration::ZERO).await.is_some());
        assert!(queue.enqueue_task("nobody", "u1", HashMap::new(), Duration::ZERO).await.is_some());

        let deleted = queue.process_queue_messages_with_wait(10, Duration::ZERO).await;
        assert_eq!(deleted, 1);
        assert_eq!(transport.depth("test_jobs"), 2);

        let stats = queue.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn test_retry_limit_archives_message() {
        let clock = ManualClock::starting_now();
        let transport = Arc::new(InMemoryMessageQueue::new(clock.shared()));
        let queue = BackgroundTaskQueue::new(transport.clone(), registry(), config(2), clock.shared());

        queue
            .enqueue_task("boom", "u1", HashMap::new(), Duration::ZERO)
            .await
            .unwrap();

        for _ in 0..2 {
            assert_eq!(queue.process_queue_messages_with_wait(10, Duration::ZERO).await, 0);
            clock.advance(Duration::from_secs(31));
        }
        assert_eq!(transport.depth("test_jobs"), 1);

        queue.process_queue_messages_with_wait(10, Duration::ZERO).await;
        assert_eq!(transport.depth("test_jobs"), 0);
        assert_eq!(transport.archived("test_jobs").len(), 1);
        assert_eq!(queue.stats().dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_enqueue_failure_returns_none() {
        let clock = ManualClock::starting_now();
        let transport = Arc::new(InMemoryMessageQueue::new(clock.shared()));
        transport.set_available(false);
        let queue = BackgroundTaskQueue::new(transport, registry(), config(0), clock.shared());

        assert!(queue.enqueue_task("ok", "u1", HashMap::new(), Duration::ZERO).await.is_none());
        assert_eq!(queue.process_queue_messages_with_wait(1, Duration::ZERO).await, 0);
        assert_eq!(queue.stats().enqueue_failures, 1);
    }
}
