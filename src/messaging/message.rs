//! # Task Messages
//!
//! Wire format shared by the producer and the consumer, and the raw delivery
//! handed out by a queue client.
//!
//! A task message is a JSON object with at least an integer `task_id`. The
//! producer also includes the payload; consumers ignore it and any unknown
//! fields, since the task store is the source of truth.

use super::MessagingError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: i64,
    /// Any JSON value; only `task_id` is read by consumers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl TaskMessage {
    pub fn new(task_id: i64, payload: impl Into<String>) -> Self {
        Self {
            task_id,
            payload: Some(serde_json::Value::String(payload.into())),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError> {
        serde_json::from_slice(bytes).map_err(|e| MessagingError::deserialization(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MessagingError> {
        serde_json::to_vec(self).map_err(|e| MessagingError::serialization(e.to_string()))
    }
}

/// One message received from the broker, not yet settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned tag used to acknowledge or reject this delivery
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    /// Set when the broker has delivered this message before
    pub redelivered: bool,
}

impl Delivery {
    pub fn new(delivery_tag: u64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_tag,
            body: body.into(),
            redelivered: false,
        }
    }

    /// Mark the delivery as a broker redelivery
    pub fn as_redelivery(mut self) -> Self {
        self.redelivered = true;
        self
    }

    /// Decode the body as a task message
    pub fn task_message(&self) -> Result<TaskMessage, MessagingError> {
        TaskMessage::from_bytes(&self.body)
    }
}
