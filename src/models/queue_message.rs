//! # Background Queue Message
//!
//! JSON body carried through the message queue. The transport's own message
//! id and receipt live on `ReceivedMessage`, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Payload for durable background work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub task_id: Uuid,
    pub task_type: String,
    pub user_id: String,
    pub task_data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Prior deliveries of this message, filled in from the transport's
    /// delivery counter on receipt
    pub retry_count: u32,
}

impl QueueMessage {
    /// Wrap a payload with a fresh task id and zero retries
    pub fn new(
        task_type: impl Into<String>,
        user_id: impl Into<String>,
        task_data: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            task_type: task_type.into(),
            user_id: user_id.into(),
            task_data,
            created_at: now,
            retry_count: 0,
        }
    }

    /// Message attributes available for filtered consumption
    pub fn attributes(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("task_type", self.task_type.clone()),
            ("user_id", self.user_id.clone()),
        ])
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn from_json(json: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json)
    }

    /// Look up a field of `task_data`
    pub fn data(&self, field: &str) -> Option<&serde_json::Value> {
        self.task_data.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_defaults() {
        let data = HashMap::from([("file_id".to_string(), serde_json::json!("f-9"))]);
        let message = QueueMessage::new("index_document", "u1", data, Utc::now());

        assert_eq!(message.retry_count, 0);
        assert_eq!(message.data("file_id"), Some(&serde_json::json!("f-9")));
        assert_eq!(message.attributes()["task_type"], "index_document");
        assert_eq!(message.attributes()["user_id"], "u1");
    }

    #[test]
    fn test_wire_format_field_names() {
        let message = QueueMessage::new("quiz", "u2", HashMap::new(), Utc::now());
        let json = serde_json::to_value(&message).unwrap();

        for field in ["task_id", "task_type", "user_id", "task_data", "created_at", "retry_count"] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(QueueMessage::from_json(json).unwrap(), message);
    }
}
