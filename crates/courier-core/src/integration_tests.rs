//! End-to-end scenarios on the in-memory adapters.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

use crate::app::{App, AppBuilder, ProcessOutcome, WorkerGroup};
use crate::boundary::{ApiRequest, HEADER_CORRELATION_ID, HEADER_LOCATION};
use crate::config::Limits;
use crate::domain::{Outcome, ProcessingError, RequestId, TaskEnvelope, TaskId, TaskStatus};
use crate::impls::{FnExecutor, InMemoryQueueConfig, InMemoryTaskQueue, InMemoryTaskStore};
use crate::ports::DeliverySource;

struct Harness {
    app: App,
    store: Arc<InMemoryTaskStore>,
    queue: Arc<InMemoryTaskQueue>,
}

fn harness(limits: Limits, max_receive_count: u32) -> Harness {
    let store = Arc::new(InMemoryTaskStore::new());
    let queue = Arc::new(InMemoryTaskQueue::new(InMemoryQueueConfig {
        visibility_timeout: Duration::from_secs(30),
        max_receive_count,
    }));
    // payload に "fail": true を持つ task だけ失敗させる
    let executor = FnExecutor::new(|task: TaskEnvelope| {
        let fail = task.payload.get("fail").and_then(Value::as_bool).unwrap_or(false);
        std::future::ready(Ok(if fail {
            Outcome::failure("requested failure")
        } else {
            Outcome::success()
        }))
    });
    let app = AppBuilder::new()
        .store(store.clone())
        .queue(queue.clone())
        .executor(Arc::new(executor))
        .limits(limits)
        .build()
        .unwrap();
    Harness { app, store, queue }
}

fn submit_request(body: Value) -> ApiRequest {
    ApiRequest::new(RequestId::from_ulid(Ulid::new()))
        .with_header("X-Correlation-Id", "corr-1")
        .with_body(body.to_string())
}

#[tokio::test(start_paused = true)]
async fn submit_resubmit_and_process_once() {
    let h = harness(Limits::default(), 5);

    let first = h
        .app
        .handle_submit(submit_request(json!({"taskId": "t1", "payload": {"n": 1}})))
        .await;
    assert_eq!(first.status, 202);
    assert_eq!(first.header(HEADER_LOCATION), Some("/tasks/t1"));
    assert_eq!(first.header(HEADER_CORRELATION_ID), Some("corr-1"));
    assert_eq!(
        first.json_body().unwrap(),
        json!({"message": "Accepted", "taskId": "t1", "correlationId": "corr-1"})
    );

    let again = h
        .app
        .handle_submit(submit_request(json!({"taskId": "t1", "payload": {"n": 2}})))
        .await;
    assert_eq!(again.status, 202);
    assert_eq!(again.header(HEADER_LOCATION), None);
    assert_eq!(h.queue.counts().await.sent, 1);

    let delivery = h.queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
    let envelope: Value = serde_json::from_str(&delivery.body).unwrap();
    assert_eq!(envelope["payload"], json!({"n": 1}));
    assert_eq!(envelope["correlationId"], "corr-1");

    assert_eq!(h.app.process(&delivery).await.unwrap(), ProcessOutcome::Processed);
    h.queue.ack(&delivery.receipt_handle).await.unwrap();

    let view = h.app.task_status(&TaskId::new("t1")).await.unwrap().unwrap();
    assert_eq!(view.status, TaskStatus::Processed);
    assert!(view.latency_ms.is_some());

    // 同じ envelope が再配送されても何も書かない
    let writes = h.store.write_count();
    assert_eq!(
        h.app.process(&delivery).await.unwrap(),
        ProcessOutcome::AlreadyProcessed
    );
    assert_eq!(h.store.write_count(), writes);
}

#[tokio::test(start_paused = true)]
async fn failure_on_third_receive_is_delayed_by_backoff() {
    let h = harness(Limits::default(), 5);
    h.app
        .handle_submit(submit_request(
            json!({"taskId": "t2", "payload": {"fail": true}}),
        ))
        .await;

    // receive 1 → 10s, receive 2 → 20s
    for expected_count in 1..=2u32 {
        let d = h.queue.receive(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(d.receive_count(), expected_count);
        assert!(h.app.process(&d).await.is_err());
    }

    let third = h.queue.receive(Duration::from_secs(60)).await.unwrap().unwrap();
    assert_eq!(third.receive_count(), 3);
    let err = h.app.process(&third).await.unwrap_err();
    assert!(matches!(err, ProcessingError::Executor(_)));

    // min(900, 5 * 2^3) = 40s
    assert!(h.queue.receive(Duration::from_secs(39)).await.unwrap().is_none());
    let fourth = h.queue.receive(Duration::from_secs(2)).await.unwrap().unwrap();
    assert_eq!(fourth.receive_count(), 4);

    let view = h.app.task_status(&TaskId::new("t2")).await.unwrap().unwrap();
    assert_eq!(view.status, TaskStatus::Processing);
}

#[tokio::test]
async fn rejected_submissions_leave_no_trace() {
    let h = harness(Limits::default().with_max_task_id_length(4), 5);

    let cases = [
        (Some("{not json".to_string()), "Invalid JSON body"),
        (None, "Invalid taskId"),
        (Some(json!({"taskId": "toolong", "payload": {}}).to_string()), "Invalid taskId"),
        (Some(json!({"taskId": "t3", "payload": "x"}).to_string()), "Invalid payload"),
        (Some(json!({"taskId": "t3", "payload": null}).to_string()), "Invalid payload"),
    ];

    for (body, message) in cases {
        let mut request = ApiRequest::new(RequestId::from_ulid(Ulid::new()));
        request.body = body;
        let response = h.app.handle_submit(request).await;

        assert_eq!(response.status, 400);
        let parsed = response.json_body().unwrap();
        assert_eq!(parsed["message"], message);
        assert!(parsed["correlationId"].as_str().unwrap().starts_with("req-"));
    }

    assert_eq!(h.store.write_count(), 0);
    assert_eq!(h.queue.counts().await.sent, 0);
}

#[tokio::test]
async fn infrastructure_faults_are_internal_errors() {
    let h = harness(Limits::default(), 5);

    h.store.set_unavailable(true);
    let response = h
        .app
        .handle_submit(submit_request(json!({"taskId": "t4", "payload": {}})))
        .await;
    assert_eq!(response.status, 500);
    assert_eq!(response.json_body().unwrap()["message"], "Internal Server Error");

    h.store.set_unavailable(false);
    h.queue.set_fail_sends(true);
    let response = h
        .app
        .handle_submit(submit_request(json!({"taskId": "t4", "payload": {}})))
        .await;
    assert_eq!(response.status, 500);
}

#[tokio::test(start_paused = true)]
async fn workers_drive_tasks_to_completion_or_dead_letter() {
    let h = harness(Limits::default().with_backoff_seconds(1, 4), 3);

    for i in 0..5 {
        h.app
            .handle_submit(submit_request(json!({"taskId": format!("ok-{i}"), "payload": {}})))
            .await;
    }
    h.app
        .handle_submit(submit_request(
            json!({"taskId": "doomed", "payload": {"fail": true}}),
        ))
        .await;

    let group = WorkerGroup::spawn(
        3,
        h.queue.clone(),
        h.app.processing(),
        h.app.forensics(),
        Duration::from_millis(200),
    );
    tokio::time::sleep(Duration::from_secs(60)).await;
    let stats = group.shutdown_and_join().await;

    assert_eq!(stats.succeeded, 5);
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.dead_letters, 1);

    let counts = h.store.counts().await;
    assert_eq!(counts.processed, 5);
    assert_eq!(counts.processing, 1);

    let queue = h.queue.counts().await;
    assert_eq!(queue.acknowledged, 5);
    assert_eq!(queue.dead_lettered, 1);
    assert_eq!(queue.in_flight, 0);
}
