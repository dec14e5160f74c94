//! InvocationContext - 1 回の呼び出しに付随するログ文脈
//!
//! グローバルなロガー状態に key を積み上げる代わりに、
//! 呼び出しごとにこの値を作って span として渡します。

use tracing::Span;

use super::{CorrelationId, Delivery, MessageId, TaskId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub correlation_id: CorrelationId,
    pub task_id: Option<TaskId>,
    pub message_id: Option<MessageId>,
    pub receive_count: Option<u32>,
}

impl InvocationContext {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            task_id: None,
            message_id: None,
            receive_count: None,
        }
    }

    /// Context for one delivery; ids are filled in once the envelope is resolved.
    pub fn for_delivery(correlation_id: CorrelationId, delivery: &Delivery) -> Self {
        Self {
            correlation_id,
            task_id: None,
            message_id: Some(delivery.message_id),
            receive_count: Some(delivery.receive_count()),
        }
    }

    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Fill in ids resolved after `span` was entered.
    pub fn record(&self, span: &Span) {
        if let Some(task_id) = &self.task_id {
            span.record("task_id", task_id.as_str());
        }
    }

    pub fn span(&self, stage: &'static str) -> Span {
        tracing::info_span!(
            "courier",
            stage,
            correlation_id = %self.correlation_id,
            task_id = self.task_id.as_ref().map(TaskId::as_str),
            message_id = self.message_id.map(|id| tracing::field::display(id)),
            receive_count = self.receive_count,
        )
    }
}
