//! Validation - 投入リクエストの検証
//!
//! 副作用（store / queue への書き込み）の前にすべてを検査します。
//! 失敗は `ValidationError` として呼び出し側へ返り、4xx になります。

use serde_json::Value;
use tracing::warn;

use crate::config::Limits;
use crate::domain::{TaskId, ValidationError};

/// A submission that passed every check.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSubmission {
    pub task_id: TaskId,
    /// Always a JSON object.
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct Validator {
    max_task_id_length: usize,
    max_payload_size_bytes: usize,
}

impl Validator {
    pub fn new(limits: &Limits) -> Self {
        Self {
            max_task_id_length: limits.max_task_id_length,
            max_payload_size_bytes: limits.max_payload_size_bytes,
        }
    }

    pub fn validate(
        &self,
        task_id: Option<&Value>,
        payload: Option<&Value>,
    ) -> Result<ValidatedSubmission, ValidationError> {
        let result = self
            .check_task_id(task_id)
            .and_then(|task_id| Ok((task_id, self.check_payload(payload)?)));

        match result {
            Ok((task_id, payload)) => Ok(ValidatedSubmission { task_id, payload }),
            Err(e) => {
                warn!(field = e.field(), error = %e, "submission rejected");
                Err(e)
            }
        }
    }

    fn check_task_id(&self, value: Option<&Value>) -> Result<TaskId, ValidationError> {
        let raw = match value {
            None | Some(Value::Null) => return Err(ValidationError::MissingTaskId),
            Some(Value::String(s)) => s,
            Some(_) => return Err(ValidationError::TaskIdNotString),
        };
        if raw.is_empty() {
            return Err(ValidationError::MissingTaskId);
        }
        // UTF-16 code units, same as a JavaScript string length
        let len = raw.encode_utf16().count();
        if len > self.max_task_id_length {
            return Err(ValidationError::TaskIdTooLong {
                len,
                max: self.max_task_id_length,
            });
        }
        Ok(TaskId::new(raw.clone()))
    }

    fn check_payload(&self, value: Option<&Value>) -> Result<Value, ValidationError> {
        let payload = match value {
            Some(v @ Value::Object(_)) => v,
            _ => return Err(ValidationError::PayloadNotObject),
        };
        // 計測はシリアライズ後のバイト数
        let size = serde_json::to_vec(payload)
            .map(|bytes| bytes.len())
            .map_err(|_| ValidationError::PayloadNotObject)?;
        if size > self.max_payload_size_bytes {
            return Err(ValidationError::PayloadTooLarge {
                size,
                max: self.max_payload_size_bytes,
            });
        }
        Ok(payload.clone())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&Limits::default())
    }
}
