//! TaskQueue port - at-least-once 配送キュー
//!
//! producer 側（`TaskQueue`）と consumer 側（`DeliverySource`）を分けています。
//! processing workflow が必要とするのは `delay_redelivery` だけなので、
//! ワークフローは `TaskQueue` だけに依存します。

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{Delivery, MessageId, OutboundMessage, QueueError, ReceiptHandle};

/// Producer-facing side of the queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Best-effort enqueue. Success means the substrate accepted the message.
    async fn send(&self, message: OutboundMessage) -> Result<MessageId, QueueError>;

    /// Push back the time at which this delivery becomes visible again.
    async fn delay_redelivery(
        &self,
        receipt: &ReceiptHandle,
        delay: Duration,
    ) -> Result<(), QueueError>;
}

/// Consumer-facing side of the queue, used by worker loops.
///
/// A delivery that is not acked becomes visible again once its visibility
/// window (possibly extended by `delay_redelivery`) lapses. After the
/// configured maximum receive count the message moves to the dead-letter
/// channel instead.
#[async_trait]
pub trait DeliverySource: Send + Sync {
    /// Wait up to `wait` for a visible message.
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Delete the message behind this receipt.
    async fn ack(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Wait up to `wait` for a message on the dead-letter channel.
    async fn receive_dead_letter(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;
}
