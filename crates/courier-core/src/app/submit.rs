//! SubmissionWorkflow - 検証 → 条件付き作成 → enqueue
//!
//! # 冪等性
//! - `create_if_absent` が唯一のアトミック操作
//! - 作成できなかった（既に存在する）場合は成功扱いで、再 enqueue しない
//! - よって distinct な taskId ごとに enqueue は高々 1 回
//!
//! 作成後に send が失敗すると RECEIVED のまま残ります。再投入しても
//! `created = false` になるので enqueue されません（既知の制約）。

use serde_json::Value;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info};

use crate::app::validation::Validator;
use crate::domain::{
    CorrelationId, InvocationContext, MessageId, OutboundMessage, QueueError, SubmitError,
    TaskEnvelope, TaskId, TaskRecord,
};
use crate::ports::{Clock, TaskQueue, TaskStore};

/// Raw submission as it came off the boundary. Fields are unchecked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitRequest {
    pub task_id: Option<Value>,
    pub payload: Option<Value>,
}

impl SubmitRequest {
    /// Pull `taskId` and `payload` out of a parsed JSON body.
    pub fn from_body(body: &Value) -> Self {
        Self {
            task_id: body.get("taskId").cloned(),
            payload: body.get("payload").cloned(),
        }
    }
}

/// Successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub task_id: TaskId,
    /// False when the task already existed (idempotent accept).
    pub created: bool,
    /// Set only when this call enqueued the task.
    pub message_id: Option<MessageId>,
}

pub struct SubmissionWorkflow {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn TaskQueue>,
    validator: Validator,
    clock: Arc<dyn Clock>,
}

impl SubmissionWorkflow {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn TaskQueue>,
        validator: Validator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            queue,
            validator,
            clock,
        }
    }

    pub async fn submit(
        &self,
        request: SubmitRequest,
        correlation_id: CorrelationId,
    ) -> Result<Admission, SubmitError> {
        let ctx = InvocationContext::new(correlation_id);
        let span = ctx.span("submit");
        self.submit_inner(request, ctx).instrument(span).await
    }

    async fn submit_inner(
        &self,
        request: SubmitRequest,
        ctx: InvocationContext,
    ) -> Result<Admission, SubmitError> {
        let submission = self
            .validator
            .validate(request.task_id.as_ref(), request.payload.as_ref())?;
        let task_id = submission.task_id;
        debug!(task_id = %task_id, "submission validated");

        let record = TaskRecord::received(task_id.clone(), self.clock.now());
        let outcome = self.store.create_if_absent(record).await.inspect_err(|e| {
            error!(task_id = %task_id, error = %e, "task store create failed");
        })?;

        if !outcome.created {
            info!(task_id = %task_id, "duplicate submission accepted without enqueue");
            return Ok(Admission {
                task_id,
                created: false,
                message_id: None,
            });
        }

        let envelope = TaskEnvelope::new(task_id.clone(), submission.payload, ctx.correlation_id);
        let message = OutboundMessage::from_envelope(&envelope)
            .map_err(QueueError::from)?;
        let message_id = self.queue.send(message).await.inspect_err(|e| {
            error!(task_id = %task_id, error = %e, "enqueue failed after admission");
        })?;

        info!(task_id = %task_id, message_id = %message_id, "task accepted");
        Ok(Admission {
            task_id,
            created: true,
            message_id: Some(message_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StoreError, TaskStatus, ValidationError};
    use crate::impls::{InMemoryTaskQueue, InMemoryTaskStore};
    use crate::ports::SystemClock;
    use serde_json::json;

    struct Fixture {
        store: Arc<InMemoryTaskStore>,
        queue: Arc<InMemoryTaskQueue>,
        workflow: SubmissionWorkflow,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryTaskStore::new());
        let queue = Arc::new(InMemoryTaskQueue::default());
        let workflow = SubmissionWorkflow::new(
            store.clone(),
            queue.clone(),
            Validator::default(),
            Arc::new(SystemClock),
        );
        Fixture {
            store,
            queue,
            workflow,
        }
    }

    fn request(task_id: &str) -> SubmitRequest {
        SubmitRequest::from_body(&json!({"taskId": task_id, "payload": {"n": 1}}))
    }

    #[tokio::test]
    async fn first_submission_creates_and_enqueues_once() {
        let f = fixture();

        let first = f
            .workflow
            .submit(request("t1"), CorrelationId::new("c1"))
            .await
            .unwrap();
        let second = f
            .workflow
            .submit(request("t1"), CorrelationId::new("c2"))
            .await
            .unwrap();

        assert!(first.created);
        assert!(first.message_id.is_some());
        assert!(!second.created);
        assert_eq!(second.message_id, None);
        assert_eq!(f.queue.counts().await.sent, 1);

        let record = f.store.get(&TaskId::new("t1")).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Received);
        assert_eq!(record.processed_at, None);
    }

    #[tokio::test]
    async fn invalid_submission_has_no_side_effects() {
        let f = fixture();
        let err = f
            .workflow
            .submit(
                SubmitRequest::from_body(&json!({"taskId": "t1", "payload": "nope"})),
                CorrelationId::new("c"),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Validation(ValidationError::PayloadNotObject)
        ));
        assert_eq!(err.status_code(), 400);
        assert_eq!(f.store.write_count(), 0);
        assert_eq!(f.queue.counts().await.sent, 0);
    }

    #[tokio::test]
    async fn store_outage_is_a_server_failure() {
        let f = fixture();
        f.store.set_unavailable(true);

        let err = f
            .workflow
            .submit(request("t1"), CorrelationId::new("c"))
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Store(StoreError::Unavailable(_))));
        assert_eq!(err.status_code(), 500);
        assert_eq!(f.queue.counts().await.sent, 0);
    }

    #[tokio::test]
    async fn send_failure_leaves_record_and_is_a_server_failure() {
        let f = fixture();
        f.queue.set_fail_sends(true);

        let err = f
            .workflow
            .submit(request("t1"), CorrelationId::new("c"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(f.store.get(&TaskId::new("t1")).await.unwrap().is_some());

        // 再投入しても作成済みなので enqueue されない
        f.queue.set_fail_sends(false);
        let retry = f
            .workflow
            .submit(request("t1"), CorrelationId::new("c"))
            .await
            .unwrap();
        assert!(!retry.created);
        assert_eq!(f.queue.counts().await.sent, 0);
    }

    #[tokio::test]
    async fn concurrent_duplicates_enqueue_exactly_once() {
        let f = fixture();
        let workflow = Arc::new(f.workflow);

        let mut joins = Vec::new();
        for i in 0..8 {
            let workflow = Arc::clone(&workflow);
            joins.push(tokio::spawn(async move {
                workflow
                    .submit(request("same"), CorrelationId::new(format!("c{i}")))
                    .await
                    .unwrap()
                    .created
            }));
        }
        let mut created = 0;
        for j in joins {
            if j.await.unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(f.queue.counts().await.sent, 1);
    }
}
