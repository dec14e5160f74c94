//! WorkerGroup / DeadLetterMonitor - キューを消費するバックグラウンドループ
//!
//! - 成功したら ack、失敗したら ack しない（delay 済みなので後で再配送される）
//! - `shutdown_and_join()` で新規の受信を止め、全ループの終了を待つ
//! - 実行中の処理は強制キャンセルしない

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::app::forensics::DeadLetterForensics;
use crate::app::process::ProcessingWorkflow;
use crate::ports::DeliverySource;

/// Backoff after the substrate itself errors on receive.
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_millis(200);

/// Counters shared by all workers of a group.
#[derive(Debug, Default)]
pub struct WorkerStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
    dead_letters: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatsSnapshot {
    pub succeeded: u64,
    pub failed: u64,
    pub dead_letters: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
        }
    }
}

/// Worker group handle.
/// - `shutdown_tx` を drop するとワーカー全体が止まる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl WorkerGroup {
    /// Spawn `n` processing workers plus one dead-letter monitor.
    pub fn spawn(
        n: usize,
        source: Arc<dyn DeliverySource>,
        workflow: Arc<ProcessingWorkflow>,
        forensics: DeadLetterForensics,
        poll: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(WorkerStats::default());

        let mut joins = Vec::with_capacity(n + 1);
        for worker_id in 0..n {
            let source = Arc::clone(&source);
            let workflow = Arc::clone(&workflow);
            let stats = Arc::clone(&stats);
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, source, workflow, stats, poll, &mut rx).await;
            }));
        }

        let monitor = DeadLetterMonitor {
            source,
            forensics,
            stats: Arc::clone(&stats),
            poll,
        };
        let mut rx = shutdown_rx;
        joins.push(tokio::spawn(async move { monitor.run(&mut rx).await }));

        Self {
            shutdown_tx,
            joins,
            stats,
        }
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop taking new deliveries. In-flight processing is not cancelled.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) -> WorkerStatsSnapshot {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
        self.stats.snapshot()
    }
}

async fn worker_loop(
    worker_id: usize,
    source: Arc<dyn DeliverySource>,
    workflow: Arc<ProcessingWorkflow>,
    stats: Arc<WorkerStats>,
    poll: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // receive は待つので shutdown と競合させる
        let received = tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender が drop された場合も止める
                if changed.is_err() {
                    break;
                }
                continue;
            }
            received = source.receive(poll) => received,
        };

        let delivery = match received {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(e) => {
                error!(worker_id, error = %e, "receive failed");
                tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                continue;
            }
        };

        match workflow.process(&delivery).await {
            Ok(outcome) => {
                stats.succeeded.fetch_add(1, Ordering::Relaxed);
                debug!(worker_id, ?outcome, message_id = %delivery.message_id, "delivery done");
                if let Err(e) = source.ack(&delivery.receipt_handle).await {
                    // visibility が切れて別の worker に渡った後など
                    warn!(worker_id, error = %e, "ack failed");
                }
            }
            Err(_) => {
                // ack しない。delay 済みなので substrate が再配送する
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Drains the dead-letter channel into forensic records.
struct DeadLetterMonitor {
    source: Arc<dyn DeliverySource>,
    forensics: DeadLetterForensics,
    stats: Arc<WorkerStats>,
    poll: Duration,
}

impl DeadLetterMonitor {
    async fn run(self, shutdown_rx: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let received = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = self.source.receive_dead_letter(self.poll) => received,
            };

            match received {
                Ok(Some(delivery)) => {
                    self.forensics.record(&delivery);
                    self.stats.dead_letters.fetch_add(1, Ordering::Relaxed);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "dead-letter receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                }
            }
        }
    }
}
