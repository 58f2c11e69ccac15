//! Task store trait abstraction.

use async_trait::async_trait;
use relay_core::{ExecutionHandle, PipelineId, ScopeId, Task, TaskId, TaskStatus, Time};

/// Error type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Task not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Batch insert would overwrite an existing task
    #[error("Duplicate task: {0}")]
    Duplicate(String),

    /// The requested swap is not a legal state-machine transition
    #[error("Illegal transition: {from} -> {to}")]
    IllegalTransition {
        /// Status the caller expected
        from: TaskStatus,
        /// Status the caller asked for
        to: TaskStatus,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Status change applied by a successful compare-and-set.
#[derive(Debug, Clone)]
pub struct StatusChange {
    /// New status
    pub status: TaskStatus,
    /// Failure reason; set only for `Failed`/`Expired` targets
    pub reason: Option<String>,
}

impl StatusChange {
    /// Change to a status without a reason.
    pub fn to(status: TaskStatus) -> Self {
        Self {
            status,
            reason: None,
        }
    }

    /// Change to `Failed` with the given reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            reason: Some(reason.into()),
        }
    }

    /// Change to `Expired` with the given reason.
    pub fn expired(reason: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Expired,
            reason: Some(reason.into()),
        }
    }
}

/// Result of a compare-and-set attempt.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The swap was applied; carries the updated task.
    Swapped(Task),
    /// The task's current status did not match the expectation.
    Conflict {
        /// Status actually observed
        actual: TaskStatus,
    },
}

impl CasOutcome {
    /// Whether the swap was applied.
    pub fn swapped(&self) -> bool {
        matches!(self, Self::Swapped(_))
    }
}

/// Durable record of every task.
///
/// All status transitions go through [`compare_and_set_status`]; blind
/// status overwrites are not part of the contract. Implementations must
/// honor:
///
/// - terminal statuses (`Success`, `Failed`, `Expired`) are absorbing: a
///   swap out of a terminal status is a `Conflict` even when `expected`
///   matches the stored status;
/// - a swap bumps `last_updated_at` and replaces `failure_reason` with the
///   change's reason;
/// - a swap into `Running` increments `attempts`.
///
/// [`compare_and_set_status`]: TaskStore::compare_and_set_status
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Save a task (create or update).
    async fn save(&self, task: &Task) -> Result<()>;

    /// Insert a batch of new tasks atomically: either every task becomes
    /// visible or none does. Fails with [`StoreError::Duplicate`] if any
    /// task already exists.
    async fn save_all(&self, tasks: &[Task]) -> Result<()>;

    /// Load a task by ID.
    async fn get(&self, id: TaskId) -> Result<Option<Task>>;

    /// Atomically swap `expected` status for `change` on one task.
    ///
    /// Returns [`CasOutcome::Conflict`] when the stored status differs from
    /// `expected` or is terminal. An `expected -> change.status` pair the
    /// state machine forbids is an [`StoreError::IllegalTransition`].
    async fn compare_and_set_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        change: StatusChange,
    ) -> Result<CasOutcome>;

    /// Persist the in-flight executor handle without touching status.
    async fn record_handle(&self, id: TaskId, handle: &ExecutionHandle) -> Result<()>;

    /// All `Running` tasks in the scope whose `last_updated_at` is older
    /// than `cutoff`. The reaper's scan.
    async fn running_older_than(&self, scope: &ScopeId, cutoff: Time) -> Result<Vec<Task>>;

    /// All tasks in the scope with the given status.
    async fn by_status(&self, scope: &ScopeId, status: TaskStatus) -> Result<Vec<Task>>;

    /// Number of tasks in `{Queued, Running}` for the scope+pipeline pair.
    ///
    /// Admission derives its running-count from this query on every call
    /// rather than maintaining a live counter.
    async fn count_active(&self, scope: &ScopeId, pipeline: &PipelineId) -> Result<usize>;

    /// Oldest `Queued` task for the pair whose `eligible_after` has passed,
    /// if any. Feeds the scheduling pass.
    async fn oldest_queued(
        &self,
        scope: &ScopeId,
        pipeline: &PipelineId,
        now: Time,
    ) -> Result<Option<Task>>;
}
