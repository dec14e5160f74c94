//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - プロセス単位のシングルトンではなく、依存はすべて注入する

use std::sync::Arc;

use crate::app::forensics::DeadLetterForensics;
use crate::app::process::{ProcessOutcome, ProcessingWorkflow};
use crate::app::retry::BackoffPolicy;
use crate::app::status::StatusView;
use crate::app::submit::SubmissionWorkflow;
use crate::app::validation::Validator;
use crate::boundary::{self, ApiRequest, ApiResponse};
use crate::config::{ConfigError, Limits};
use crate::domain::{Delivery, ProcessingError, StoreError, TaskId};
use crate::ports::{Clock, SystemClock, TaskExecutor, TaskQueue, TaskStore};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .store(store)
///     .queue(queue)
///     .executor(executor)
///     .limits(limits)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - store / queue / executor のどれかが欠けていれば BuildError
/// - limits が不正（0 や base > max）でも BuildError
pub struct AppBuilder {
    store: Option<Arc<dyn TaskStore>>,
    queue: Option<Arc<dyn TaskQueue>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    clock: Arc<dyn Clock>,
    limits: Limits,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no task store configured")]
    MissingStore,

    #[error("no task queue configured")]
    MissingQueue,

    #[error("no task executor configured")]
    MissingExecutor,

    #[error(transparent)]
    InvalidLimits(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            queue: None,
            executor: None,
            clock: Arc::new(SystemClock),
            limits: Limits::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.limits.validate()?;
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let queue = self.queue.ok_or(BuildError::MissingQueue)?;
        let executor = self.executor.ok_or(BuildError::MissingExecutor)?;

        let submission = SubmissionWorkflow::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Validator::new(&self.limits),
            self.clock,
        );
        let processing = ProcessingWorkflow::new(
            Arc::clone(&store),
            queue,
            executor,
            BackoffPolicy::from_limits(&self.limits),
        );

        Ok(App {
            store,
            submission,
            processing: Arc::new(processing),
            forensics: DeadLetterForensics::new(self.limits.max_log_body_bytes),
            limits: self.limits,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は配線済みのワークフロー一式
pub struct App {
    store: Arc<dyn TaskStore>,
    submission: SubmissionWorkflow,
    processing: Arc<ProcessingWorkflow>,
    forensics: DeadLetterForensics,
    limits: Limits,
}

impl App {
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Submission boundary: request in, HTTP-equivalent response out.
    pub async fn handle_submit(&self, request: ApiRequest) -> ApiResponse {
        boundary::handle_submit(&self.submission, request).await
    }

    pub async fn process(&self, delivery: &Delivery) -> Result<ProcessOutcome, ProcessingError> {
        self.processing.process(delivery).await
    }

    /// Shared handle for worker groups.
    pub fn processing(&self) -> Arc<ProcessingWorkflow> {
        Arc::clone(&self.processing)
    }

    pub fn forensics(&self) -> DeadLetterForensics {
        self.forensics.clone()
    }

    pub async fn task_status(&self, task_id: &TaskId) -> Result<Option<StatusView>, StoreError> {
        Ok(self.store.get(task_id).await?.map(StatusView::from))
    }
}
