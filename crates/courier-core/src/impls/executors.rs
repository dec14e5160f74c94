//! TaskExecutor の実装
//!
//! - **FnExecutor**: クロージャをそのまま executor にする
//! - **TypedExecutor**: payload を型 `T` に decode してから `Handler<T>` に渡す
//! - **FlakyExecutor**: 一定確率で失敗する模擬ワーク（デモ・スモーク用）

use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use crate::domain::{Outcome, TaskEnvelope};
use crate::ports::{ExecutorError, TaskExecutor};

/// Adapts an async closure into a `TaskExecutor`.
pub struct FnExecutor<F> {
    f: F,
}

impl<F, Fut> FnExecutor<F>
where
    F: Fn(TaskEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome, ExecutorError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F>
where
    F: Fn(TaskEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome, ExecutorError>> + Send,
{
    async fn execute(&self, task: &TaskEnvelope) -> Result<Outcome, ExecutorError> {
        (self.f)(task.clone()).await
    }
}

/// Handler は decode 済みの payload を受け取って Outcome を返す
///
/// # 使用例
/// ```ignore
/// #[derive(Deserialize)]
/// struct Resize { width: u32 }
///
/// struct ResizeHandler;
///
/// #[async_trait]
/// impl Handler<Resize> for ResizeHandler {
///     async fn handle(&self, payload: Resize) -> Result<Outcome, ExecutorError> {
///         Ok(Outcome::success())
///     }
/// }
///
/// let executor = TypedExecutor::new(ResizeHandler);
/// ```
#[async_trait]
pub trait Handler<T>: Send + Sync
where
    T: DeserializeOwned + Send + 'static,
{
    async fn handle(&self, payload: T) -> Result<Outcome, ExecutorError>;
}

/// Decodes the payload into `T` and runs the handler.
///
/// A payload that does not decode is reported as a failure outcome, which
/// sends the message down the retry path like any other failure.
pub struct TypedExecutor<T, H> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T, H> TypedExecutor<T, H>
where
    T: DeserializeOwned + Send + 'static,
    H: Handler<T>,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, H> TaskExecutor for TypedExecutor<T, H>
where
    T: DeserializeOwned + Send + 'static,
    H: Handler<T>,
{
    async fn execute(&self, task: &TaskEnvelope) -> Result<Outcome, ExecutorError> {
        let payload: T = match serde_json::from_value(task.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return Ok(Outcome::failure(format!("payload decode: {e}"))),
        };
        self.handler.handle(payload).await
    }
}

/// Simulated unit of work: sleeps for a random latency, then fails with
/// probability `failure_rate`.
#[derive(Debug, Clone)]
pub struct FlakyExecutor {
    failure_rate: f64,
    min_latency: Duration,
    max_latency: Duration,
}

impl FlakyExecutor {
    pub fn new(failure_rate: f64) -> Self {
        Self {
            failure_rate: if failure_rate.is_nan() {
                0.0
            } else {
                failure_rate.clamp(0.0, 1.0)
            },
            min_latency: Duration::from_millis(100),
            max_latency: Duration::from_millis(300),
        }
    }

    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }

    fn draw(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let latency = if self.max_latency > self.min_latency {
            rng.gen_range(self.min_latency..=self.max_latency)
        } else {
            self.min_latency
        };
        (latency, rng.gen_bool(self.failure_rate))
    }
}

#[async_trait]
impl TaskExecutor for FlakyExecutor {
    async fn execute(&self, _task: &TaskEnvelope) -> Result<Outcome, ExecutorError> {
        // ThreadRng は Send ではないので await の前に引いておく
        let (latency, fail) = self.draw();
        tokio::time::sleep(latency).await;
        if fail {
            return Ok(Outcome::failure("simulated_failure"));
        }
        Ok(Outcome::success())
    }
}
