//! Domain model (IDs, task record, envelope, outcome, errors, invocation context).

pub mod context;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod task;

pub use context::InvocationContext;
pub use envelope::{
    ATTR_CORRELATION_ID, ATTR_TASK_ID, Delivery, MessageAttributes, OutboundMessage,
    TaskEnvelope, WireEnvelope,
};
pub use errors::{FailureClass, ProcessingError, QueueError, StoreError, SubmitError, ValidationError};
pub use ids::{CorrelationId, MessageId, ReceiptHandle, RequestId, TaskId};
pub use outcome::{Outcome, OutcomeKind};
pub use task::{TaskRecord, TaskStatus};
