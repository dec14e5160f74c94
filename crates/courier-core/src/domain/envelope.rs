//! TaskEnvelope - キューを流れる配送単位
//!
//! body は `{taskId, payload, correlationId}` の JSON。
//! `taskId` と `correlationId` は attribute にも複製し、
//! body を parse しなくても consumer（forensics など）が参照できるようにします。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CorrelationId, MessageId, ReceiptHandle, TaskId};

/// Attribute key holding the task id.
pub const ATTR_TASK_ID: &str = "taskId";

/// Attribute key holding the correlation id.
pub const ATTR_CORRELATION_ID: &str = "correlationId";

/// String-typed message attributes.
pub type MessageAttributes = BTreeMap<String, String>;

/// Dispatch envelope written by submission and read by processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvelope {
    pub task_id: TaskId,
    pub payload: serde_json::Value,
    pub correlation_id: CorrelationId,
}

impl TaskEnvelope {
    pub fn new(task_id: TaskId, payload: serde_json::Value, correlation_id: CorrelationId) -> Self {
        Self {
            task_id,
            payload,
            correlation_id,
        }
    }
}

/// A message ready to be handed to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: String,
    pub attributes: MessageAttributes,
}

impl OutboundMessage {
    /// Serialize the envelope into the wire body and duplicate the ids into attributes.
    pub fn from_envelope(envelope: &TaskEnvelope) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(envelope)?;
        let mut attributes = MessageAttributes::new();
        attributes.insert(ATTR_TASK_ID.to_string(), envelope.task_id.to_string());
        attributes.insert(
            ATTR_CORRELATION_ID.to_string(),
            envelope.correlation_id.to_string(),
        );
        Ok(Self { body, attributes })
    }
}

/// One delivery attempt of a message, as seen by a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message_id: MessageId,
    pub receipt_handle: ReceiptHandle,
    pub body: String,
    pub attributes: MessageAttributes,
    /// Maintained by the substrate; may overcount, may be missing.
    pub approximate_receive_count: Option<u32>,
    pub sent_timestamp: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Receive count, defaulting to 1 when the substrate omits it.
    pub fn receive_count(&self) -> u32 {
        self.approximate_receive_count.unwrap_or(1)
    }
}

/// Body shape as read off the wire: every field optional, unknown fields ignored.
///
/// Strictness lives in the JSON itself (it must be an object); missing fields
/// are resolved by the caller against the attributes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl WireEnvelope {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("envelope body must be a JSON object"));
        }
        serde_json::from_value(value)
    }
}
