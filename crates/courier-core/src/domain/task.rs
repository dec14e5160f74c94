//! Task record: what the store keeps per task id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TaskId;

/// Lifecycle status of a task.
///
/// Transitions under correct operation:
/// - Received -> Processing -> Processed
/// - Processing -> Processing (redelivery after a failed attempt)
///
/// The store does not enforce forward-only movement; `set_status` is a blind
/// overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Received,
    Processing,
    Processed,
}

impl TaskStatus {
    /// No further work is performed for a task in this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Processed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Received => "RECEIVED",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Processed => "PROCESSED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store record shape: `{taskId, status, createdAt, lastUpdatedAt, processedAt?}`.
///
/// The payload is deliberately absent; it only travels inside the queue message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// A freshly admitted task.
    pub fn received(task_id: TaskId, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Received,
            created_at: now,
            last_updated_at: now,
            processed_at: None,
        }
    }

    /// Overwrite the status, stamping `lastUpdatedAt` (and `processedAt` on completion).
    pub fn apply_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        self.status = status;
        self.last_updated_at = now;
        if status == TaskStatus::Processed {
            self.processed_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_serializes_as_screaming_snake_case() {
        let s = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(s, "\"PROCESSING\"");
    }

    #[test]
    fn record_uses_camel_case_and_omits_missing_processed_at() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let record = TaskRecord::received(TaskId::new("t1"), now);
        let v = serde_json::to_value(&record).unwrap();

        assert_eq!(v["taskId"], "t1");
        assert_eq!(v["status"], "RECEIVED");
        assert!(v.get("lastUpdatedAt").is_some());
        assert!(v.get("processedAt").is_none());
    }

    #[test]
    fn completing_stamps_processed_at() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let done = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 5).unwrap();
        let mut record = TaskRecord::received(TaskId::new("t1"), created);

        record.apply_status(TaskStatus::Processing, created);
        assert_eq!(record.processed_at, None);

        record.apply_status(TaskStatus::Processed, done);
        assert_eq!(record.status, TaskStatus::Processed);
        assert_eq!(record.last_updated_at, done);
        assert_eq!(record.processed_at, Some(done));
        assert_eq!(record.created_at, created);
    }
}
