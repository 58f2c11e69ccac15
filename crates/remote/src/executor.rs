//! Executor abstraction.

use async_trait::async_trait;
use relay_core::{ExecutionHandle, PayloadRef};

/// Errors from a remote executor backend.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The backend has no capacity right now. Transient: the task stays
    /// queued and a later scheduling pass retries.
    #[error("executor at capacity: {0}")]
    Rejected(String),

    /// Submission failed hard (transport, auth, malformed payload).
    #[error("submit failed: {0}")]
    Submit(String),

    /// Abort request failed. Abort is best-effort; callers log and move on.
    #[error("abort failed: {0}")]
    Abort(String),
}

impl ExecutorError {
    /// Whether this error is the transient no-capacity refusal.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// A remote execution backend.
///
/// Completion is not reported through this trait: executors deliver results
/// asynchronously to the completion resolver, by push or poll.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Submit a payload for execution, returning the in-flight handle.
    async fn submit(&self, payload: &PayloadRef) -> Result<ExecutionHandle, ExecutorError>;

    /// Request abort of an in-flight execution. Best-effort; the execution
    /// may still run to completion and deliver a (then-ignored) result.
    async fn abort(&self, handle: &ExecutionHandle) -> Result<(), ExecutorError>;
}
