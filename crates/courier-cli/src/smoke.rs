//! submit / smoke サブコマンドの本体

use anyhow::{Result, bail};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use courier_core::app::{App, StatusReport};
use courier_core::boundary::{ApiRequest, HEADER_CORRELATION_ID, HEADER_LOCATION};
use courier_core::domain::TaskId;
use courier_core::ports::{IdGenerator, SystemClock, UlidGenerator};

use crate::Pipeline;
use crate::stats::LatencyStats;

struct SmokeTask {
    task_id: String,
    correlation_id: String,
    submitted_at: Instant,
    latency: Option<Duration>,
}

fn request(task_id: &str, payload: Value, correlation_id: Option<&str>) -> ApiRequest {
    let ids = UlidGenerator::new(SystemClock);
    let mut req = ApiRequest::new(ids.generate_request_id())
        .with_header("content-type", "application/json")
        .with_body(json!({"taskId": task_id, "payload": payload}).to_string());
    if let Some(c) = correlation_id {
        req = req.with_header(HEADER_CORRELATION_ID, c);
    }
    req
}

async fn report(pipeline: Pipeline) -> StatusReport {
    let workers = pipeline.workers.shutdown_and_join().await;
    StatusReport {
        tasks: pipeline.store.counts().await,
        queue: pipeline.queue.counts().await,
        workers,
    }
}

pub async fn submit_one(
    pipeline: Pipeline,
    task_id: String,
    payload: Value,
    correlation_id: Option<String>,
    timeout: Duration,
) -> Result<()> {
    let response = pipeline
        .app
        .handle_submit(request(&task_id, payload, correlation_id.as_deref()))
        .await;
    println!("{} {}", response.status, response.body);
    if response.status != 202 {
        report(pipeline).await;
        bail!("submission rejected with status {}", response.status);
    }

    let deadline = Instant::now() + timeout;
    let id = TaskId::new(task_id);
    let mut done = None;
    while Instant::now() < deadline {
        if let Some(view) = pipeline.app.task_status(&id).await? {
            if view.is_done() {
                done = Some(view);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let status = report(pipeline).await;
    println!("{status}");
    match done {
        Some(view) => {
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        None => bail!("task {id} not processed within {timeout:?}"),
    }
}

pub async fn run(
    pipeline: Pipeline,
    count: usize,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let base = format!(
        "smoke-{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    );
    let mut tasks: Vec<SmokeTask> = (1..=count)
        .map(|i| SmokeTask {
            task_id: format!("{base}-{i}"),
            correlation_id: format!("corr-{base}-{i}"),
            submitted_at: Instant::now(),
            latency: None,
        })
        .collect();

    info!(count, "submitting tasks");
    let submit_start = Instant::now();
    let failures = submit_all(&pipeline.app, &mut tasks, true).await;
    if !failures.is_empty() {
        report(pipeline).await;
        bail!("{} submissions failed, first: {}", failures.len(), failures[0]);
    }
    info!(ms = submit_start.elapsed().as_millis() as u64, "all tasks submitted");

    // 再投入: 202 のまま、enqueue は増えない
    let failures = submit_all(&pipeline.app, &mut tasks, false).await;
    if !failures.is_empty() {
        report(pipeline).await;
        bail!("{} resubmissions misbehaved, first: {}", failures.len(), failures[0]);
    }
    let sent = pipeline.queue.counts().await.sent;
    if sent != count as u64 {
        report(pipeline).await;
        bail!("expected {count} enqueued messages, queue saw {sent}");
    }

    let deadline = Instant::now() + timeout;
    let mut first_done: Option<Duration> = None;
    while Instant::now() < deadline {
        let mut progressed = false;
        for task in tasks.iter_mut().filter(|t| t.latency.is_none()) {
            let Some(view) = pipeline
                .app
                .task_status(&TaskId::new(task.task_id.clone()))
                .await?
            else {
                continue;
            };
            if view.is_done() {
                let latency = task.submitted_at.elapsed();
                first_done.get_or_insert(latency);
                task.latency = Some(latency);
                progressed = true;
                info!(task_id = %task.task_id, latency_ms = latency.as_millis() as u64, "task processed");
            } else {
                debug!(task_id = %task.task_id, status = %view.status, "task pending");
            }
        }

        if tasks.iter().all(|t| t.latency.is_some()) {
            break;
        }
        if !progressed {
            tokio::time::sleep(interval).await;
        }
    }

    let samples: Vec<u64> = tasks
        .iter()
        .filter_map(|t| t.latency.map(|d| d.as_millis() as u64))
        .collect();
    let all_done = samples.len() == tasks.len();

    let mut summary = LatencyStats::from_samples(&samples)
        .map(|s| s.to_json())
        .unwrap_or_else(|| json!({"count": 0}));
    summary["timeToFirstProcessedMs"] = json!(first_done.map(|d| d.as_millis() as u64));
    summary["timeToAllProcessedMs"] = json!(all_done.then(|| samples.iter().max().copied()).flatten());

    let status = report(pipeline).await;
    println!("latency (ms): {}", serde_json::to_string_pretty(&summary)?);
    println!("{status}");

    if !all_done {
        let pending: Vec<&str> = tasks
            .iter()
            .filter(|t| t.latency.is_none())
            .map(|t| t.task_id.as_str())
            .collect();
        warn!(?pending, "some tasks not processed within timeout");
        bail!("{} of {} tasks not processed within {timeout:?}", pending.len(), count);
    }
    info!("all tasks processed successfully");
    Ok(())
}

/// Submit every task concurrently. On the first pass each response must carry
/// `location`; on resubmission it must not.
async fn submit_all(app: &Arc<App>, tasks: &mut [SmokeTask], first_pass: bool) -> Vec<String> {
    let mut joins = Vec::with_capacity(tasks.len());
    for task in tasks.iter_mut() {
        if first_pass {
            task.submitted_at = Instant::now();
        }
        let app = Arc::clone(app);
        let req = request(
            &task.task_id,
            json!({"smoke": true, "ix": task.task_id}),
            Some(&task.correlation_id),
        );
        joins.push(tokio::spawn(async move { app.handle_submit(req).await }));
    }

    let mut failures = Vec::new();
    for (task, join) in tasks.iter().zip(joins) {
        match join.await {
            Ok(resp) if resp.status != 202 => {
                failures.push(format!("{}: {} {}", task.task_id, resp.status, resp.body));
            }
            Ok(resp) if resp.header(HEADER_LOCATION).is_some() != first_pass => {
                failures.push(format!("{}: unexpected location header state", task.task_id));
            }
            Ok(_) => {}
            Err(e) => failures.push(format!("{}: {e}", task.task_id)),
        }
    }
    failures
}
