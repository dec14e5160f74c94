//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **SubmissionWorkflow**: 検証 → 条件付き作成 → enqueue
//! - **ProcessingWorkflow**: status 確認 → 実行 → status 更新、失敗時は backoff
//! - **DeadLetterForensics**: dead-letter メッセージの診断記録
//! - **WorkerGroup**: キューを消費するバックグラウンドループ

pub mod builder;
pub mod forensics;
pub mod process;
pub mod retry;
pub mod status;
pub mod submit;
pub mod validation;
pub mod worker;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::forensics::{DeadLetterForensics, ForensicRecord};
pub use self::process::{ProcessOutcome, ProcessingWorkflow};
pub use self::retry::BackoffPolicy;
pub use self::status::{StatusReport, StatusView};
pub use self::submit::{Admission, SubmissionWorkflow, SubmitRequest};
pub use self::validation::{ValidatedSubmission, Validator};
pub use self::worker::{WorkerGroup, WorkerStatsSnapshot};
