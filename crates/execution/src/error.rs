//! Engine error type.

use relay_core::{BackendKind, TaskId, TaskStatus};
use relay_remote::ExecutorError;
use relay_storage::StoreError;

use crate::admission::PolicyError;

/// Errors surfaced by the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Task store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Admission policy source error; the task is never created
    #[error("admission error: {0}")]
    Policy(#[from] PolicyError),

    /// Hard (non-rejection) executor error
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Task not found
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// Operation attempted against the wrong lifecycle status
    #[error("task {task} is {actual}, expected {expected}")]
    InvalidState {
        /// Task the operation targeted
        task: TaskId,
        /// Status the operation requires
        expected: TaskStatus,
        /// Status actually observed
        actual: TaskStatus,
    },

    /// `enqueue_sequential` called with no tasks
    #[error("cannot enqueue an empty chain")]
    EmptyChain,

    /// Task already linked into a chain or past its fresh state
    #[error("task {0} already belongs to a chain")]
    AlreadyChained(TaskId),

    /// No executor registered for the task's backend tag
    #[error("no executor registered for backend {0}")]
    UnknownBackend(BackendKind),
}
