//! TaskExecutor port - 実際の仕事をする差し替え可能な実行器

use async_trait::async_trait;

use crate::domain::{Outcome, TaskEnvelope};

/// Executes the unit of work behind one task.
///
/// Both `Err` and a failure `Outcome` count as a processing failure; the
/// distinction only shows up in logs.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskEnvelope) -> Result<Outcome, ExecutorError>;
}

/// Error raised by an executor that could not produce an outcome at all.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ExecutorError(pub String);

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
