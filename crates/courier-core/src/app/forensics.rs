//! DeadLetterForensics - dead-letter に落ちたメッセージの診断記録
//!
//! リトライも状態変更もせず、エラーも返しません。
//! 1 メッセージにつき 1 件、`error!` で構造化ログを出すだけです。

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::domain::{ATTR_CORRELATION_ID, ATTR_TASK_ID, Delivery, WireEnvelope};

const UNKNOWN_TASK_ID: &str = "unknown";
const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForensicRecord {
    pub task_id: String,
    pub correlation_id: String,
    pub message_id: String,
    pub receive_count: Option<u32>,
    pub sent_timestamp: Option<DateTime<Utc>>,
    pub body_preview: String,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct DeadLetterForensics {
    max_body_bytes: usize,
}

impl DeadLetterForensics {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    /// Build the record without emitting it.
    pub fn inspect(&self, delivery: &Delivery) -> ForensicRecord {
        let parsed = WireEnvelope::parse(&delivery.body).ok();

        let task_id = delivery
            .attribute(ATTR_TASK_ID)
            .map(str::to_string)
            .or_else(|| {
                parsed
                    .as_ref()
                    .and_then(|w| w.task_id.clone())
                    .filter(|id| !id.is_empty())
            })
            .unwrap_or_else(|| UNKNOWN_TASK_ID.to_string());

        let correlation_id = delivery
            .attribute(ATTR_CORRELATION_ID)
            .map(str::to_string)
            .or_else(|| {
                parsed
                    .as_ref()
                    .and_then(|w| w.correlation_id.clone())
                    .filter(|id| !id.is_empty())
            })
            .unwrap_or_else(|| delivery.message_id.to_string());

        let (body_preview, truncated) = preview(&delivery.body, self.max_body_bytes);

        ForensicRecord {
            task_id,
            correlation_id,
            message_id: delivery.message_id.to_string(),
            receive_count: delivery.approximate_receive_count,
            sent_timestamp: delivery.sent_timestamp,
            body_preview,
            truncated,
        }
    }

    /// Emit the diagnostic record for one dead-lettered delivery.
    pub fn record(&self, delivery: &Delivery) -> ForensicRecord {
        let record = self.inspect(delivery);
        error!(
            task_id = %record.task_id,
            correlation_id = %record.correlation_id,
            message_id = %record.message_id,
            receive_count = record.receive_count,
            sent_timestamp = ?record.sent_timestamp,
            body_preview = %record.body_preview,
            truncated = record.truncated,
            "task moved to dead-letter queue"
        );
        record
    }
}

/// The body exactly as delivered, cut at `max_bytes` on a char boundary.
fn preview(body: &str, max_bytes: usize) -> (String, bool) {
    if body.len() <= max_bytes {
        return (body.to_string(), false);
    }
    let mut cut = max_bytes;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    (format!("{}{TRUNCATION_MARKER}", &body[..cut]), true)
}
