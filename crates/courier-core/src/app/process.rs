//! ProcessingWorkflow - 配送された 1 メッセージの処理
//!
//! # 流れ
//! 1. envelope を parse（壊れていれば processing failure）
//! 2. taskId を body → attribute の順で解決
//! 3. 現在の status を読む。PROCESSED なら何もせず成功
//! 4. PROCESSING に更新 → executor 実行 → PROCESSED に更新
//! 5. 失敗したら backoff を計算して `delay_redelivery`、その上で失敗を返す
//!
//! status の更新は前提条件なしの上書きなので、visibility window が重なると
//! 同じ task が二重に実行されうる（PROCESSED の確認はあくまで緩和策）。

use serde_json::Value;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, warn};

use crate::app::retry::BackoffPolicy;
use crate::domain::{
    ATTR_CORRELATION_ID, ATTR_TASK_ID, CorrelationId, Delivery, InvocationContext,
    ProcessingError, TaskEnvelope, TaskId, TaskStatus, WireEnvelope,
};
use crate::ports::{TaskExecutor, TaskQueue, TaskStore};

/// What happened to a delivery that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The task was already PROCESSED; nothing was written or executed.
    AlreadyProcessed,
    Processed,
}

pub struct ProcessingWorkflow {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn TaskQueue>,
    executor: Arc<dyn TaskExecutor>,
    backoff: BackoffPolicy,
}

impl ProcessingWorkflow {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn TaskQueue>,
        executor: Arc<dyn TaskExecutor>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            queue,
            executor,
            backoff,
        }
    }

    /// Process one delivery. On `Err`, the redelivery delay has already been
    /// requested and the delivery must not be acked.
    pub async fn process(&self, delivery: &Delivery) -> Result<ProcessOutcome, ProcessingError> {
        let wire = WireEnvelope::parse(&delivery.body);
        let correlation_id = resolve_correlation_id(wire.as_ref().ok(), delivery);
        let ctx = InvocationContext::for_delivery(correlation_id, delivery);
        let span = ctx.span("process");

        async {
            let result = self.run(wire, delivery, ctx).await;
            if let Err(e) = &result {
                self.schedule_retry(delivery, e).await;
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        wire: Result<WireEnvelope, serde_json::Error>,
        delivery: &Delivery,
        ctx: InvocationContext,
    ) -> Result<ProcessOutcome, ProcessingError> {
        let wire = wire.map_err(ProcessingError::MalformedEnvelope)?;

        let task_id = wire
            .task_id
            .filter(|id| !id.is_empty())
            .or_else(|| delivery.attribute(ATTR_TASK_ID).map(str::to_string))
            .map(TaskId::new)
            .ok_or(ProcessingError::MissingTaskId)?;
        let ctx = ctx.with_task_id(task_id.clone());
        ctx.record(&tracing::Span::current());

        if let Some(record) = self.store.get(&task_id).await? {
            if record.status == TaskStatus::Processed {
                info!(task_id = %task_id, "task already processed, skipping");
                return Ok(ProcessOutcome::AlreadyProcessed);
            }
        }

        self.store
            .set_status(&task_id, TaskStatus::Processing)
            .await?;
        debug!(task_id = %task_id, "task marked processing");

        let envelope = TaskEnvelope::new(
            task_id.clone(),
            wire.payload.unwrap_or_else(|| Value::Object(Default::default())),
            ctx.correlation_id,
        );
        let outcome = self
            .executor
            .execute(&envelope)
            .await
            .map_err(|e| ProcessingError::Executor(e.to_string()))?;
        if !outcome.is_success() {
            let reason = outcome
                .reason
                .unwrap_or_else(|| "executor reported failure".to_string());
            return Err(ProcessingError::Executor(reason));
        }

        self.store
            .set_status(&task_id, TaskStatus::Processed)
            .await?;
        info!(task_id = %task_id, "task processed");
        Ok(ProcessOutcome::Processed)
    }

    /// Ask the substrate to hold the message back before the next attempt.
    /// Failure here is logged and swallowed; the processing error still wins.
    async fn schedule_retry(&self, delivery: &Delivery, cause: &ProcessingError) {
        let receive_count = delivery.receive_count();
        let delay = self.backoff.delay_for(receive_count);
        warn!(
            error = %cause,
            receive_count,
            delay_secs = delay.as_secs(),
            "processing failed, backing off"
        );
        if let Err(e) = self
            .queue
            .delay_redelivery(&delivery.receipt_handle, delay)
            .await
        {
            error!(error = %e, "failed to set redelivery delay");
        }
    }
}

/// body → attribute → the message's own id.
fn resolve_correlation_id(wire: Option<&WireEnvelope>, delivery: &Delivery) -> CorrelationId {
    wire.and_then(|w| w.correlation_id.as_deref())
        .filter(|id| !id.is_empty())
        .or_else(|| delivery.attribute(ATTR_CORRELATION_ID))
        .map(CorrelationId::new)
        .unwrap_or_else(|| CorrelationId::from(delivery.message_id))
}
