//! TaskStore port - task id をキーにした key-value ストア
//!
//! # 契約
//! - `create_if_absent`: 唯一のアトミックな操作。キー重複はエラーではなく `created = false`
//! - `get`: 存在しなくてもエラーにしない
//! - `set_status`: 前提条件なしの上書き（last writer wins）

use async_trait::async_trait;

use crate::domain::{StoreError, TaskId, TaskRecord, TaskStatus};

/// Result of a conditional create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOutcome {
    pub created: bool,
}

/// Key-value store of task records.
///
/// `set_status` is a blind overwrite: two consumers that both observed
/// `RECEIVED` can both move the task forward, and whichever writes
/// `PROCESSED` last wins. Callers rely on the status check before work
/// to mitigate duplicate execution, not to prevent it.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert the record unless one with the same task id exists.
    async fn create_if_absent(&self, record: TaskRecord) -> Result<CreateOutcome, StoreError>;

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// Overwrite status and `lastUpdatedAt`, stamping `processedAt` on `PROCESSED`.
    async fn set_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<(), StoreError>;
}
