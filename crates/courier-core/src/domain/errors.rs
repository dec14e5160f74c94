//! Errors - エラー型と分類
//!
//! # 分類
//! - `ValidationError`: 呼び出し側の入力不正（4xx、リトライしない、enqueue しない）
//! - `StoreError` / `QueueError`: インフラ障害
//!   - submission では 5xx
//!   - processing では processing failure（backoff してリトライ）
//! - `ProcessingError`: 1 メッセージの処理失敗（常に backoff + リトライ）
//!
//! 重複投入（duplicate admission）はエラーではなく `created = false` の成功。

use thiserror::Error;

use super::ReceiptHandle;

/// Caller-side input problem detected before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("request body is not valid JSON")]
    InvalidJson,

    #[error("taskId is missing")]
    MissingTaskId,

    #[error("taskId must be a string")]
    TaskIdNotString,

    #[error("taskId is {len} UTF-16 units long, limit is {max}")]
    TaskIdTooLong { len: usize, max: usize },

    #[error("payload must be a JSON object")]
    PayloadNotObject,

    #[error("payload is {size} bytes, limit is {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

impl ValidationError {
    /// Message returned to the submitter in the 4xx body.
    pub fn public_message(&self) -> &'static str {
        match self {
            ValidationError::InvalidJson => "Invalid JSON body",
            ValidationError::MissingTaskId
            | ValidationError::TaskIdNotString
            | ValidationError::TaskIdTooLong { .. } => "Invalid taskId",
            ValidationError::PayloadNotObject | ValidationError::PayloadTooLarge { .. } => {
                "Invalid payload"
            }
        }
    }

    /// Which input field failed, for diagnostics.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidJson => "body",
            ValidationError::MissingTaskId
            | ValidationError::TaskIdNotString
            | ValidationError::TaskIdTooLong { .. } => "taskId",
            ValidationError::PayloadNotObject | ValidationError::PayloadTooLarge { .. } => {
                "payload"
            }
        }
    }
}

/// Infrastructure fault on store access. A key collision is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    #[error("task store operation failed: {0}")]
    OperationFailed(String),
}

/// Infrastructure fault on queue access.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue operation failed: {0}")]
    OperationFailed(String),

    #[error("receipt handle {0} is not current")]
    UnknownReceipt(ReceiptHandle),

    #[error("message encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure while processing one delivered message. Always takes the
/// backoff-and-retry path.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    #[error("missing_taskId")]
    MissingTaskId,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("executor failed: {0}")]
    Executor(String),
}

/// Failure classification visible to the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Client,
    Server,
}

/// Submission failure.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl SubmitError {
    pub fn class(&self) -> FailureClass {
        match self {
            SubmitError::Validation(_) => FailureClass::Client,
            SubmitError::Store(_) | SubmitError::Queue(_) => FailureClass::Server,
        }
    }

    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self.class() {
            FailureClass::Client => 400,
            FailureClass::Server => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_public_messages() {
        assert_eq!(ValidationError::InvalidJson.public_message(), "Invalid JSON body");
        assert_eq!(
            ValidationError::TaskIdTooLong { len: 129, max: 128 }.public_message(),
            "Invalid taskId"
        );
        assert_eq!(
            ValidationError::PayloadNotObject.public_message(),
            "Invalid payload"
        );
    }

    #[test]
    fn submit_errors_are_classified() {
        let client: SubmitError = ValidationError::MissingTaskId.into();
        assert_eq!(client.class(), FailureClass::Client);
        assert_eq!(client.status_code(), 400);

        let server: SubmitError = StoreError::Unavailable("down".into()).into();
        assert_eq!(server.class(), FailureClass::Server);
        assert_eq!(server.status_code(), 500);

        let server: SubmitError = QueueError::OperationFailed("down".into()).into();
        assert_eq!(server.status_code(), 500);
    }
}
