//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: テスト用の task store（障害注入つき）
//! - **InMemoryTaskQueue**: visibility timeout と dead-letter を持つ配送キュー
//! - **FnExecutor / TypedExecutor / FlakyExecutor**: TaskExecutor の実装
//!
//! # 本番用実装
//! DynamoDB / SQS などの実装は別クレートに置く想定です。

pub mod executors;
pub mod inmem_queue;
pub mod inmem_store;

pub use self::executors::{FlakyExecutor, FnExecutor, Handler, TypedExecutor};
pub use self::inmem_queue::{InMemoryQueueConfig, InMemoryTaskQueue};
pub use self::inmem_store::{InMemoryTaskStore, StoreCounts};
