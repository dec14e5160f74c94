//! InMemoryTaskStore - 開発・テスト用のタスクストア
//!
//! # 実装詳細
//! - `HashMap<TaskId, TaskRecord>` を tokio の Mutex で保護
//! - ロックは各操作の中で完結（await を跨がない）
//! - 障害注入（unavailable / 特定ステータスへの書き込み失敗）をサポート

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::domain::{StoreError, TaskId, TaskRecord, TaskStatus};
use crate::ports::{Clock, CreateOutcome, SystemClock, TaskStore};

/// Counts by status, for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub received: usize,
    pub processing: usize,
    pub processed: usize,
}

pub struct InMemoryTaskStore<C = SystemClock> {
    records: Mutex<HashMap<TaskId, TaskRecord>>,
    clock: C,
    unavailable: AtomicBool,
    reject_status: StdMutex<Option<TaskStatus>>,
    /// Successful mutating calls (creates that inserted, status writes).
    writes: AtomicU64,
}

impl InMemoryTaskStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryTaskStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryTaskStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
            reject_status: StdMutex::new(None),
            writes: AtomicU64::new(0),
        }
    }

    /// Make every call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `set_status` fail whenever it writes `status`.
    pub fn reject_status_writes(&self, status: Option<TaskStatus>) {
        if let Ok(mut guard) = self.reject_status.lock() {
            *guard = status;
        }
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn counts(&self) -> StoreCounts {
        let records = self.records.lock().await;
        let mut counts = StoreCounts::default();
        for record in records.values() {
            match record.status {
                TaskStatus::Received => counts.received += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Processed => counts.processed += 1,
            }
        }
        counts
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }

    fn is_rejected(&self, status: TaskStatus) -> bool {
        self.reject_status
            .lock()
            .map(|guard| *guard == Some(status))
            .unwrap_or(false)
    }
}

#[async_trait]
impl<C: Clock> TaskStore for InMemoryTaskStore<C> {
    async fn create_if_absent(&self, record: TaskRecord) -> Result<CreateOutcome, StoreError> {
        self.check_available()?;
        let mut records = self.records.lock().await;
        match records.entry(record.task_id.clone()) {
            Entry::Occupied(_) => Ok(CreateOutcome { created: false }),
            Entry::Vacant(slot) => {
                slot.insert(record);
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(CreateOutcome { created: true })
            }
        }
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        self.check_available()?;
        let records = self.records.lock().await;
        Ok(records.get(task_id).cloned())
    }

    /// Upserts like a key-value update expression: a missing record is created
    /// with the given status.
    async fn set_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<(), StoreError> {
        self.check_available()?;
        if self.is_rejected(status) {
            return Err(StoreError::OperationFailed(format!(
                "injected failure writing {status}"
            )));
        }
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        records
            .entry(task_id.clone())
            .or_insert_with(|| TaskRecord::received(task_id.clone(), now))
            .apply_status(status, now);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
