//! Status - ポーリング用のステータスビュー

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::app::worker::WorkerStatsSnapshot;
use crate::domain::{TaskId, TaskRecord, TaskStatus};
use crate::impls::StoreCounts;
use crate::observability::QueueCounts;

/// One task as seen by a poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Milliseconds from admission to completion, once processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
}

impl StatusView {
    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<TaskRecord> for StatusView {
    fn from(record: TaskRecord) -> Self {
        let latency_ms = record
            .processed_at
            .map(|done| (done - record.created_at).num_milliseconds());
        Self {
            task_id: record.task_id,
            status: record.status,
            created_at: record.created_at,
            last_updated_at: record.last_updated_at,
            processed_at: record.processed_at,
            latency_ms,
        }
    }
}

/// Aggregate view across store, queue and workers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub tasks: StoreCounts,
    pub queue: QueueCounts,
    pub workers: WorkerStatsSnapshot,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tasks: received={} processing={} processed={}",
            self.tasks.received, self.tasks.processing, self.tasks.processed
        )?;
        writeln!(
            f,
            "queue: available={} in_flight={} sent={} acked={} dead_lettered={}",
            self.queue.available,
            self.queue.in_flight,
            self.queue.sent,
            self.queue.acknowledged,
            self.queue.dead_lettered
        )?;
        write!(
            f,
            "workers: succeeded={} failed={} dead_letters={}",
            self.workers.succeeded, self.workers.failed, self.workers.dead_letters
        )
    }
}
