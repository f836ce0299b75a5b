//! PostgreSQL message queue transport backed by the pgmq extension.

use crate::models::QueueMessage;
use crate::queue::errors::{QueueError, QueueResult};
use crate::queue::service::{MessageId, MessageQueueService, ReceiptHandle, ReceivedMessage};
use async_trait::async_trait;
use pgmq::PGMQueue;
use std::time::Duration;
use tracing::{debug, info, warn};

/// pgmq queue names become table names; keep them short and plain
const MAX_QUEUE_NAME_LEN: usize = 47;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PgmqMessageQueue {
    pgmq: PGMQueue,
    pool: sqlx::PgPool,
}

impl PgmqMessageQueue {
    /// Build on an existing pool so the queue shares connections with the
    /// durable cache and task ledger
    pub async fn new_with_pool(pool: sqlx::PgPool) -> Self {
        info!("🚀 Creating pgmq queue transport with shared connection pool");
        let pgmq = PGMQueue::new_with_pool(pool.clone()).await;
        Self { pgmq, pool }
    }

    pub fn validate_queue_name(queue_name: &str) -> QueueResult<()> {
        if queue_name.is_empty() || queue_name.len() > MAX_QUEUE_NAME_LEN {
            return Err(QueueError::invalid_queue_name(
                queue_name,
                format!("length must be 1..={MAX_QUEUE_NAME_LEN}"),
            ));
        }
        if !queue_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(QueueError::invalid_queue_name(
                queue_name,
                "only ASCII letters, digits and underscores are allowed",
            ));
        }
        Ok(())
    }

    fn message_id(queue_name: &str, receipt: &ReceiptHandle) -> QueueResult<i64> {
        receipt.as_str().parse().map_err(|_| {
            warn!(queue = %queue_name, receipt = %receipt, "⚠️ Malformed receipt handle");
            QueueError::InvalidReceipt(receipt.to_string())
        })
    }

    fn op_error(queue_name: &str, operation: &str) -> impl FnOnce(pgmq::errors::PgmqError) -> QueueError {
        let queue_name = queue_name.to_string();
        let operation = operation.to_string();
        move |e| QueueError::queue_operation(queue_name, operation, e.to_string())
    }
}

#[async_trait]
impl MessageQueueService for PgmqMessageQueue {
    async fn ensure_queue(&self, queue_name: &str) -> QueueResult<()> {
        Self::validate_queue_name(queue_name)?;
        self.pgmq
            .create(queue_name)
            .await
            .map_err(Self::op_error(queue_name, "create"))?;
        debug!(queue = %queue_name, "📋 Queue ready");
        Ok(())
    }

    async fn send_message(
        &self,
        queue_name: &str,
        message: &QueueMessage,
        delay: Duration,
    ) -> QueueResult<MessageId> {
        let body = serde_json::to_value(message)
            .map_err(|e| QueueError::message_serialization(e.to_string()))?;

        let sent = if delay.is_zero() {
            self.pgmq.send(queue_name, &body).await
        } else {
            // Whole seconds, rounded up
            let seconds = delay.as_secs() + u64::from(delay.subsec_nanos() > 0);
            self.pgmq.send_delay(queue_name, &body, seconds).await
        };
        let msg_id = sent.map_err(Self::op_error(queue_name, "send"))?;

        debug!(queue = %queue_name, message_id = msg_id, "📤 Message enqueued");
        Ok(MessageId::from(msg_id))
    }

    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        let vt = i32::try_from(visibility_timeout.as_secs().max(1)).unwrap_or(i32::MAX);
        let batch = i32::try_from(max_messages).unwrap_or(i32::MAX);

        let raw = self
            .pgmq
            .read_batch_with_poll::<serde_json::Value>(
                queue_name,
                Some(vt),
                batch,
                Some(wait),
                Some(POLL_INTERVAL.min(wait.max(Duration::from_millis(10)))),
            )
            .await
            .map_err(Self::op_error(queue_name, "read"))?
            .unwrap_or_default();

        let mut received = Vec::with_capacity(raw.len());
        for envelope in raw {
            let delivery_count = u32::try_from(envelope.read_ct.max(1)).unwrap_or(1);
            match QueueMessage::from_json(envelope.message) {
                Ok(mut message) => {
                    message.retry_count = delivery_count - 1;
                    received.push(ReceivedMessage {
                        message,
                        receipt: ReceiptHandle::from(envelope.msg_id),
                        message_id: MessageId::from(envelope.msg_id),
                        delivery_count,
                        enqueued_at: envelope.enqueued_at,
                    });
                }
                Err(e) => {
                    warn!(
                        queue = %queue_name,
                        message_id = envelope.msg_id,
                        error = %e,
                        "☠️ Undecodable message moved to archive"
                    );
                    if let Err(archive_err) = self.pgmq.archive(queue_name, envelope.msg_id).await {
                        warn!(
                            queue = %queue_name,
                            message_id = envelope.msg_id,
                            error = %archive_err,
                            "⚠️ Failed to archive undecodable message"
                        );
                    }
                }
            }
        }
        Ok(received)
    }

    async fn delete_message(&self, queue_name: &str, receipt: &ReceiptHandle) -> QueueResult<()> {
        let msg_id = Self::message_id(queue_name, receipt)?;
        self.pgmq
            .delete(queue_name, msg_id)
            .await
            .map_err(Self::op_error(queue_name, "delete"))?;
        Ok(())
    }

    async fn archive_message(&self, queue_name: &str, receipt: &ReceiptHandle) -> QueueResult<()> {
        let msg_id = Self::message_id(queue_name, receipt)?;
        self.pgmq
            .archive(queue_name, msg_id)
            .await
            .map_err(Self::op_error(queue_name, "archive"))?;
        Ok(())
    }

    async fn health_check(&self) -> QueueResult<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn test_queue_name_validation() {
        assert!(PgmqMessageQueue::validate_queue_name("perf_background_tasks").is_ok());
        assert!(PgmqMessageQueue::validate_queue_name("").is_err());
        assert!(PgmqMessageQueue::validate_queue_name("bad-name").is_err());
        assert!(PgmqMessageQueue::validate_queue_name(&"q".repeat(48)).is_err());
    }

    #[tokio::test]
    async fn test_round_trip_against_live_database() {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            return;
        };
        let pool = sqlx::PgPool::connect(&url).await.unwrap();
        let queue = PgmqMessageQueue::new_with_pool(pool).await;
        let name = "perf_pgmq_round_trip";
        queue.ensure_queue(name).await.unwrap();

        let message = QueueMessage::new("summarize", "u1", HashMap::new(), Utc::now());
        queue
            .send_message(name, &message, Duration::ZERO)
            .await
            .unwrap();

        let received = queue
            .receive_messages(name, 1, Duration::from_secs(30), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message.task_id, message.task_id);
        assert_eq!(received[0].message.retry_count, 0);

        queue
            .delete_message(name, &received[0].receipt)
            .await
            .unwrap();
    }
}
