//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! ワークフローはここにある trait だけに依存し、実体（DynamoDB, SQS,
//! in-memory など）は起動時に注入されます。

pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod task_queue;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::{ExecutorError, TaskExecutor};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_queue::{DeliverySource, TaskQueue};
pub use self::task_store::{CreateOutcome, TaskStore};
