//! InMemoryTaskQueue - 開発用の at-least-once キュー
//!
//! SQS 風のセマンティクスを in-memory で再現します。
//!
//! # 実装詳細
//! - receive で visibility timeout の間だけ不可視にする（receive count +1, 新しい receipt）
//! - ack されなければ timeout 後に再び可視になる
//! - `delay_redelivery` は可視になる時刻を付け替える（古い予定は generation で無効化）
//! - receive count が `max_receive_count` に達したメッセージは再配送せず dead-letter へ
//!
//! # 学習ポイント
//! - tokio の Mutex + Notify による待機
//! - BinaryHeap（min-heap）による可視化スケジュール
//! - ロックの中で await しない

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{Delivery, MessageId, OutboundMessage, QueueError, ReceiptHandle};
use crate::observability::QueueCounts;
use crate::ports::{DeliverySource, IdGenerator, SystemClock, TaskQueue, UlidGenerator};

/// Substrate settings that live outside the core: visibility window and
/// the redrive threshold.
#[derive(Debug, Clone)]
pub struct InMemoryQueueConfig {
    /// How long a received message stays hidden when nobody adjusts it.
    pub visibility_timeout: Duration,

    /// Deliveries allowed before the message is diverted to the dead-letter channel.
    pub max_receive_count: u32,
}

impl Default for InMemoryQueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: 5,
        }
    }
}

/// Visibility schedule entry. Reverse ordering turns BinaryHeap into a min-heap.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Scheduled {
    visible_at: Instant,
    message_id: MessageId,
    generation: u64,
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.visible_at.cmp(&self.visible_at)
    }
}

#[derive(Debug)]
struct StoredMessage {
    message: OutboundMessage,
    sent_at: DateTime<Utc>,
    receive_count: u32,
    /// Some while in flight.
    receipt: Option<ReceiptHandle>,
    /// Bumped whenever the visibility schedule changes; stale heap entries are skipped.
    generation: u64,
}

#[derive(Default)]
struct QueueState {
    messages: HashMap<MessageId, StoredMessage>,
    ready: VecDeque<MessageId>,
    scheduled: BinaryHeap<Scheduled>,
    receipts: HashMap<ReceiptHandle, MessageId>,
    dead_letters: VecDeque<Delivery>,
    sent_total: u64,
    acked_total: u64,
    dead_lettered_total: u64,
}

/// What a promotion pass moved.
#[derive(Default)]
struct Promoted {
    ready: bool,
    dead_lettered: bool,
}

impl QueueState {
    /// Make due in-flight messages visible again, or dead-letter them when
    /// they have used up their deliveries.
    fn promote_due(
        &mut self,
        now: Instant,
        max_receive_count: u32,
        ids: &dyn IdGenerator,
    ) -> Promoted {
        let mut promoted = Promoted::default();
        while let Some(entry) = self.scheduled.peek() {
            if entry.visible_at > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };

            let Some(stored) = self.messages.get_mut(&entry.message_id) else {
                continue;
            };
            if stored.generation != entry.generation {
                continue;
            }
            let Some(receipt) = stored.receipt.take() else {
                continue;
            };
            self.receipts.remove(&receipt);

            if stored.receive_count >= max_receive_count {
                if let Some(stored) = self.messages.remove(&entry.message_id) {
                    self.dead_letters.push_back(Delivery {
                        message_id: entry.message_id,
                        receipt_handle: ids.generate_receipt_handle(),
                        body: stored.message.body,
                        attributes: stored.message.attributes,
                        approximate_receive_count: Some(stored.receive_count),
                        sent_timestamp: Some(stored.sent_at),
                    });
                    self.dead_lettered_total += 1;
                    promoted.dead_lettered = true;
                }
            } else {
                self.ready.push_back(entry.message_id);
                promoted.ready = true;
            }
        }
        promoted
    }

    /// Hand out the message as a new delivery attempt.
    fn lease(
        &mut self,
        message_id: MessageId,
        receipt: ReceiptHandle,
        visible_at: Instant,
    ) -> Option<Delivery> {
        let stored = self.messages.get_mut(&message_id)?;
        stored.receive_count += 1;
        stored.generation += 1;
        stored.receipt = Some(receipt);

        let delivery = Delivery {
            message_id,
            receipt_handle: receipt,
            body: stored.message.body.clone(),
            attributes: stored.message.attributes.clone(),
            approximate_receive_count: Some(stored.receive_count),
            sent_timestamp: Some(stored.sent_at),
        };
        let generation = stored.generation;

        self.receipts.insert(receipt, message_id);
        self.scheduled.push(Scheduled {
            visible_at,
            message_id,
            generation,
        });
        Some(delivery)
    }

    fn counts(&self) -> QueueCounts {
        QueueCounts {
            available: self.ready.len(),
            in_flight: self.receipts.len(),
            sent: self.sent_total,
            acknowledged: self.acked_total,
            dead_lettered: self.dead_lettered_total,
        }
    }
}

/// In-memory queue with a dead-letter channel.
///
/// # 使用例
/// ```ignore
/// let queue = InMemoryTaskQueue::new(InMemoryQueueConfig::default());
/// let id = queue.send(message).await?;
/// let delivery = queue.receive(Duration::from_secs(1)).await?;
/// ```
pub struct InMemoryTaskQueue {
    config: InMemoryQueueConfig,
    state: Mutex<QueueState>,
    notify: Notify,
    dead_letter_notify: Notify,
    ids: UlidGenerator<SystemClock>,
    fail_sends: AtomicBool,
    fail_delays: AtomicBool,
}

impl InMemoryTaskQueue {
    pub fn new(config: InMemoryQueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            dead_letter_notify: Notify::new(),
            ids: UlidGenerator::new(SystemClock),
            fail_sends: AtomicBool::new(false),
            fail_delays: AtomicBool::new(false),
        }
    }

    /// Make `send` fail with `QueueError::OperationFailed`.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make `delay_redelivery` fail with `QueueError::OperationFailed`.
    pub fn set_fail_delays(&self, fail: bool) {
        self.fail_delays.store(fail, Ordering::SeqCst);
    }

    pub async fn counts(&self) -> QueueCounts {
        let state = self.state.lock().await;
        state.counts()
    }

    fn promote(&self, state: &mut QueueState) {
        let promoted = state.promote_due(
            Instant::now(),
            self.config.max_receive_count,
            &self.ids,
        );
        if promoted.ready {
            self.notify.notify_one();
        }
        if promoted.dead_lettered {
            self.dead_letter_notify.notify_one();
        }
    }

    async fn next_delivery(&self) -> Delivery {
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                self.promote(&mut state);

                while let Some(message_id) = state.ready.pop_front() {
                    let receipt = self.ids.generate_receipt_handle();
                    let visible_at = Instant::now() + self.config.visibility_timeout;
                    if let Some(delivery) = state.lease(message_id, receipt, visible_at) {
                        return delivery;
                    }
                }

                state.scheduled.peek().map(|entry| entry.visible_at)
            };

            match next_wake {
                Some(wake_at) => {
                    tokio::select! {
                        _ = self.notify.notified() => {},
                        _ = tokio::time::sleep_until(wake_at) => {},
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    async fn next_dead_letter(&self) -> Delivery {
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                self.promote(&mut state);

                if let Some(delivery) = state.dead_letters.pop_front() {
                    return delivery;
                }

                state.scheduled.peek().map(|entry| entry.visible_at)
            };

            match next_wake {
                Some(wake_at) => {
                    tokio::select! {
                        _ = self.dead_letter_notify.notified() => {},
                        _ = tokio::time::sleep_until(wake_at) => {},
                    }
                }
                None => self.dead_letter_notify.notified().await,
            }
        }
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new(InMemoryQueueConfig::default())
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn send(&self, message: OutboundMessage) -> Result<MessageId, QueueError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(QueueError::OperationFailed("injected send failure".to_string()));
        }

        let message_id = self.ids.generate_message_id();
        {
            let mut state = self.state.lock().await;
            state.messages.insert(
                message_id,
                StoredMessage {
                    message,
                    sent_at: Utc::now(),
                    receive_count: 0,
                    receipt: None,
                    generation: 0,
                },
            );
            state.ready.push_back(message_id);
            state.sent_total += 1;
        }
        self.notify.notify_one();
        Ok(message_id)
    }

    async fn delay_redelivery(
        &self,
        receipt: &ReceiptHandle,
        delay: Duration,
    ) -> Result<(), QueueError> {
        if self.fail_delays.load(Ordering::SeqCst) {
            return Err(QueueError::OperationFailed(
                "injected visibility change failure".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let message_id = *state
            .receipts
            .get(receipt)
            .ok_or(QueueError::UnknownReceipt(*receipt))?;
        let Some(stored) = state.messages.get_mut(&message_id) else {
            return Err(QueueError::UnknownReceipt(*receipt));
        };
        stored.generation += 1;
        let generation = stored.generation;
        state.scheduled.push(Scheduled {
            visible_at: Instant::now() + delay,
            message_id,
            generation,
        });
        Ok(())
    }
}

#[async_trait]
impl DeliverySource for InMemoryTaskQueue {
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        Ok(tokio::time::timeout(wait, self.next_delivery()).await.ok())
    }

    async fn ack(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let message_id = state
            .receipts
            .remove(receipt)
            .ok_or(QueueError::UnknownReceipt(*receipt))?;
        state.messages.remove(&message_id);
        state.acked_total += 1;
        Ok(())
    }

    async fn receive_dead_letter(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        Ok(tokio::time::timeout(wait, self.next_dead_letter()).await.ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ATTR_TASK_ID, CorrelationId, TaskEnvelope, TaskId};
    use std::sync::Arc;

    fn message(task_id: &str) -> OutboundMessage {
        let envelope = TaskEnvelope::new(
            TaskId::new(task_id),
            serde_json::json!({"n": 1}),
            CorrelationId::new("corr"),
        );
        OutboundMessage::from_envelope(&envelope).unwrap()
    }

    fn queue(max_receive_count: u32) -> InMemoryTaskQueue {
        InMemoryTaskQueue::new(InMemoryQueueConfig {
            visibility_timeout: Duration::from_secs(30),
            max_receive_count,
        })
    }

    #[tokio::test]
    async fn send_receive_ack_roundtrip() {
        let queue = queue(5);
        let id = queue.send(message("t1")).await.unwrap();

        let delivery = queue
            .receive(Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.message_id, id);
        assert_eq!(delivery.approximate_receive_count, Some(1));
        assert_eq!(delivery.attribute(ATTR_TASK_ID), Some("t1"));

        queue.ack(&delivery.receipt_handle).await.unwrap();
        let counts = queue.counts().await;
        assert_eq!(counts.sent, 1);
        assert_eq!(counts.acknowledged, 1);
        assert_eq!(counts.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_times_out_when_empty() {
        let queue = queue(5);
        let got = queue.receive(Duration::from_millis(500)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unacked_message_reappears_after_visibility_timeout() {
        let queue = queue(5);
        queue.send(message("t1")).await.unwrap();

        let first = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        // 可視化されるまでは誰にも渡らない
        assert!(queue.receive(Duration::from_secs(10)).await.unwrap().is_none());

        let second = queue.receive(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(second.message_id, first.message_id);
        assert_eq!(second.approximate_receive_count, Some(2));
        assert_ne!(second.receipt_handle, first.receipt_handle);

        // 古い receipt はもう使えない
        assert!(matches!(
            queue.ack(&first.receipt_handle).await,
            Err(QueueError::UnknownReceipt(_))
        ));
        queue.ack(&second.receipt_handle).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn delay_redelivery_moves_the_visibility_deadline() {
        let queue = queue(5);
        queue.send(message("t1")).await.unwrap();
        let first = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();

        queue
            .delay_redelivery(&first.receipt_handle, Duration::from_secs(120))
            .await
            .unwrap();

        // 元の 30s では戻ってこない
        assert!(queue.receive(Duration::from_secs(100)).await.unwrap().is_none());
        let again = queue.receive(Duration::from_secs(30)).await.unwrap().unwrap();
        assert_eq!(again.approximate_receive_count, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn short_delay_brings_the_message_back_early() {
        let queue = queue(5);
        queue.send(message("t1")).await.unwrap();
        let first = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();

        queue
            .delay_redelivery(&first.receipt_handle, Duration::from_secs(2))
            .await
            .unwrap();

        let again = queue.receive(Duration::from_secs(5)).await.unwrap();
        assert!(again.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_messages_move_to_dead_letter_channel() {
        let queue = queue(2);
        let id = queue.send(message("t1")).await.unwrap();

        let _ = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        let _ = queue.receive(Duration::from_secs(60)).await.unwrap().unwrap();

        // 2 回受信済み: 次に可視になるタイミングで DLQ へ
        let dead = queue
            .receive_dead_letter(Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dead.message_id, id);
        assert_eq!(dead.approximate_receive_count, Some(2));
        assert!(dead.sent_timestamp.is_some());

        assert!(queue.receive(Duration::from_secs(60)).await.unwrap().is_none());
        let counts = queue.counts().await;
        assert_eq!(counts.dead_lettered, 1);
        assert_eq!(counts.in_flight, 0);
    }

    #[tokio::test]
    async fn send_wakes_waiting_receiver() {
        let queue = Arc::new(queue(5));

        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.receive(Duration::from_secs(5)).await.unwrap() }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.send(message("t1")).await.unwrap();

        let got = waiter.await.unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn injected_faults() {
        let queue = queue(5);
        queue.set_fail_sends(true);
        assert!(queue.send(message("t1")).await.is_err());

        queue.set_fail_sends(false);
        queue.send(message("t1")).await.unwrap();
        let delivery = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();

        queue.set_fail_delays(true);
        assert!(matches!(
            queue
                .delay_redelivery(&delivery.receipt_handle, Duration::from_secs(1))
                .await,
            Err(QueueError::OperationFailed(_))
        ));
    }
}
