//! Boundary - HTTP 相当の投入口
//!
//! トランスポートには依存しません。`ApiRequest` を受け取り、
//! ステータスコード・ヘッダ・JSON body を持つ `ApiResponse` を返します。
//!
//! | 結果 | status | body |
//! |------|--------|------|
//! | 受理 | 202 | `{message:"Accepted", taskId, correlationId}` |
//! | 入力不正 | 400 | `{message, correlationId}` |
//! | インフラ障害 | 500 | `{message:"Internal Server Error", correlationId}` |

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::app::submit::{Admission, SubmissionWorkflow, SubmitRequest};
use crate::domain::{CorrelationId, RequestId, SubmitError, TaskId, ValidationError};

pub const HEADER_CORRELATION_ID: &str = "x-correlation-id";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_LOCATION: &str = "location";

const CONTENT_TYPE_JSON: &str = "application/json";
const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Request id assigned by the transport; fallback correlation id.
    pub request_id: RequestId,
}

impl ApiRequest {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            headers: BTreeMap::new(),
            body: None,
            request_id,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive header lookup. Empty values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.header(HEADER_CORRELATION_ID)
            .map(CorrelationId::new)
            .unwrap_or_else(|| CorrelationId::from(self.request_id))
    }

    /// A missing body reads as `{}` and is left to validation.
    pub fn json_body(&self) -> Result<Value, ValidationError> {
        match self.body.as_deref() {
            None => Ok(Value::Object(Default::default())),
            Some(raw) => serde_json::from_str(raw).map_err(|_| ValidationError::InvalidJson),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedBody<'a> {
    message: &'static str,
    task_id: &'a TaskId,
    correlation_id: &'a CorrelationId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    message: &'a str,
    correlation_id: &'a CorrelationId,
}

impl ApiResponse {
    fn json<T: Serialize>(status: u16, body: &T, correlation_id: &CorrelationId) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string());
        headers.insert(HEADER_CORRELATION_ID.to_string(), correlation_id.to_string());
        let body = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
        Self {
            status,
            headers,
            body,
        }
    }

    /// 202. `location` is only set when this request created the task.
    pub fn accepted(admission: &Admission, correlation_id: &CorrelationId) -> Self {
        let body = AcceptedBody {
            message: "Accepted",
            task_id: &admission.task_id,
            correlation_id,
        };
        let mut response = Self::json(202, &body, correlation_id);
        if admission.created {
            response.headers.insert(
                HEADER_LOCATION.to_string(),
                format!("/tasks/{}", admission.task_id),
            );
        }
        response
    }

    pub fn from_error(err: &SubmitError, correlation_id: &CorrelationId) -> Self {
        let message = match err {
            SubmitError::Validation(v) => v.public_message(),
            SubmitError::Store(_) | SubmitError::Queue(_) => INTERNAL_ERROR_MESSAGE,
        };
        let body = ErrorBody {
            message,
            correlation_id,
        };
        Self::json(err.status_code(), &body, correlation_id)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json_body(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Run one submission request end to end.
pub async fn handle_submit(workflow: &SubmissionWorkflow, request: ApiRequest) -> ApiResponse {
    let correlation_id = request.correlation_id();

    let body = match request.json_body() {
        Ok(body) => body,
        Err(e) => {
            warn!(correlation_id = %correlation_id, error = %e, "submission rejected");
            return ApiResponse::from_error(&SubmitError::Validation(e), &correlation_id);
        }
    };

    match workflow
        .submit(SubmitRequest::from_body(&body), correlation_id.clone())
        .await
    {
        Ok(admission) => ApiResponse::accepted(&admission, &correlation_id),
        Err(e) => ApiResponse::from_error(&e, &correlation_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QueueError, StoreError};
    use ulid::Ulid;

    fn request() -> ApiRequest {
        ApiRequest::new(RequestId::from_ulid(Ulid::new()))
    }

    #[test]
    fn correlation_header_is_case_insensitive() {
        let req = request().with_header("X-Correlation-Id", "abc");
        assert_eq!(req.correlation_id().as_str(), "abc");
    }

    #[test]
    fn correlation_falls_back_to_request_id() {
        let req = request().with_header(HEADER_CORRELATION_ID, "");
        assert_eq!(req.correlation_id(), CorrelationId::from(req.request_id));
    }

    #[test]
    fn missing_body_reads_as_empty_object() {
        assert_eq!(request().json_body().unwrap(), serde_json::json!({}));
        assert_eq!(
            request().with_body("{nope").json_body(),
            Err(ValidationError::InvalidJson)
        );
    }

    #[test]
    fn accepted_sets_location_only_on_create() {
        let corr = CorrelationId::new("c");
        let created = Admission {
            task_id: TaskId::new("t1"),
            created: true,
            message_id: None,
        };
        let duplicate = Admission {
            created: false,
            ..created.clone()
        };

        let first = ApiResponse::accepted(&created, &corr);
        let again = ApiResponse::accepted(&duplicate, &corr);

        assert_eq!(first.status, 202);
        assert_eq!(first.header("Location"), Some("/tasks/t1"));
        assert_eq!(again.header(HEADER_LOCATION), None);
        assert_eq!(
            again.json_body().unwrap(),
            serde_json::json!({"message": "Accepted", "taskId": "t1", "correlationId": "c"})
        );
    }

    #[test]
    fn errors_map_to_status_and_message() {
        let corr = CorrelationId::new("c");

        let bad = ApiResponse::from_error(
            &SubmitError::Validation(ValidationError::TaskIdNotString),
            &corr,
        );
        assert_eq!(bad.status, 400);
        assert_eq!(bad.json_body().unwrap()["message"], "Invalid taskId");

        for err in [
            SubmitError::Store(StoreError::Unavailable("down".into())),
            SubmitError::Queue(QueueError::OperationFailed("down".into())),
        ] {
            let resp = ApiResponse::from_error(&err, &corr);
            assert_eq!(resp.status, 500);
            assert_eq!(resp.json_body().unwrap()["message"], "Internal Server Error");
            assert_eq!(resp.header(HEADER_CONTENT_TYPE), Some("application/json"));
            assert_eq!(resp.header(HEADER_CORRELATION_ID), Some("c"));
        }
    }
}
