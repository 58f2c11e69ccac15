//! Task model - the unit of remote work tracked by the orchestration core.

use serde::{Deserialize, Serialize};

use crate::id::{CorrelationId, PayloadRef, PipelineId, ScopeId, TaskId};
use crate::Time;

/// Failure reason recorded when the reaper expires a task.
pub const REASON_TIMED_OUT: &str = "task timed out";

/// Failure reason recorded on caller-requested cancellation.
pub const REASON_CANCELLED: &str = "cancelled";

/// Derived failure reason for descendants of a failed chain link.
pub const REASON_PREDECESSOR_FAILED: &str = "predecessor failed";

/// Derived failure reason for descendants of an expired chain link.
pub const REASON_PREDECESSOR_TIMED_OUT: &str = "predecessor timed out";

/// A task represents one unit of work submitted for remote execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Owning tenant scope
    pub scope: ScopeId,

    /// Pipeline the task belongs to (admission counting pair with `scope`)
    pub pipeline: PipelineId,

    /// Backend that executes this task
    pub backend: BackendKind,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// Next task in the chain, if any. The chain owns the successor's
    /// lifecycle; this task only points to it.
    pub next_task: Option<TaskId>,

    /// Caller awaiting this task's (or its chain's) outcome
    pub correlation: Option<CorrelationId>,

    /// Opaque work description reference
    pub payload: PayloadRef,

    /// Number of committed dispatch attempts (diagnostic)
    pub attempts: u32,

    /// Earliest instant the task may be dispatched
    pub eligible_after: Option<Time>,

    /// In-flight executor handle, recorded at dispatch
    pub handle: Option<ExecutionHandle>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last status change; the reaper's staleness signal
    pub last_updated_at: Time,

    /// Populated only on `Failed`/`Expired`
    pub failure_reason: Option<String>,
}

impl Task {
    /// Create a fresh task in `Queued`.
    pub fn new(scope: ScopeId, pipeline: PipelineId, backend: BackendKind, payload: PayloadRef) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: TaskId::new(),
            scope,
            pipeline,
            backend,
            status: TaskStatus::Queued,
            next_task: None,
            correlation: None,
            payload,
            attempts: 0,
            eligible_after: None,
            handle: None,
            created_at: now,
            last_updated_at: now,
            failure_reason: None,
        }
    }

    /// Attach a caller correlation token.
    pub fn with_correlation(mut self, correlation: CorrelationId) -> Self {
        self.correlation = Some(correlation);
        self
    }

    /// Delay dispatch eligibility until the given instant.
    pub fn with_eligible_after(mut self, instant: Time) -> Self {
        self.eligible_after = Some(instant);
        self
    }

    /// Whether the task has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the task occupies a concurrency slot for admission purposes.
    pub fn is_active(&self) -> bool {
        matches!(self.status, TaskStatus::Queued | TaskStatus::Running)
    }

    /// Whether the task may be dispatched at `now`.
    pub fn is_dispatchable(&self, now: Time) -> bool {
        self.status == TaskStatus::Queued
            && self.eligible_after.map(|at| at <= now).unwrap_or(true)
    }
}

/// Task lifecycle status.
///
/// A task is created `Queued` (head of chain, or unchained) or `Waiting`
/// (queued behind a predecessor), moves to `Running` when dispatched, and
/// reaches exactly one terminal status. Terminal statuses are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Eligible for dispatch
    Queued,
    /// Blocked behind a chain predecessor
    Waiting,
    /// Handed to a remote executor
    Running,
    /// Remote execution succeeded
    Success,
    /// Remote execution failed, was cancelled, or a predecessor failed
    Failed,
    /// Force-failed by the reaper after the timeout threshold
    Expired,
}

impl TaskStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Expired)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Waiting, Queued) => true,
            (Waiting, Failed) => true, // predecessor failure cascade
            (Queued, Running) => true,
            (Queued, Failed) => true, // capacity failure, cancellation, cascade
            (Running, Success) => true,
            (Running, Failed) => true,
            (Running, Expired) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Tag selecting the remote-executor backend a task runs on.
///
/// Dispatch is backend-agnostic: the tag keys a registry of executor
/// implementations, never a downcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Container-based executor (docker-equivalent runtimes included)
    Container,
    /// Virtual-machine executor
    Vm,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Vm => write!(f, "vm"),
        }
    }
}

/// Handle to an in-flight remote execution.
///
/// Recorded on the task at dispatch so cancellation and post-restart
/// recovery can reach the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHandle {
    /// Backend the execution was submitted to
    pub backend: BackendKind,
    /// Backend-specific execution token
    pub token: String,
}

impl ExecutionHandle {
    /// Create a handle.
    pub fn new(backend: BackendKind, token: impl Into<String>) -> Self {
        Self {
            backend,
            token: token.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_absorbing() {
        use TaskStatus::*;
        for terminal in [Success, Failed, Expired] {
            for next in [Queued, Waiting, Running, Success, Failed, Expired] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn running_only_moves_to_terminal() {
        use TaskStatus::*;
        assert!(Running.can_transition_to(Success));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Expired));
        assert!(!Running.can_transition_to(Queued));
        assert!(!Running.can_transition_to(Waiting));
    }

    #[test]
    fn new_task_is_queued_and_dispatchable() {
        let task = Task::new(
            ScopeId::new("acme"),
            PipelineId::new("deploy"),
            BackendKind::Container,
            PayloadRef::new("payload-1"),
        );
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.is_active());
        assert!(task.is_dispatchable(chrono::Utc::now()));
        assert!(task.failure_reason.is_none());
    }

    #[test]
    fn eligible_after_gates_dispatch() {
        let now = chrono::Utc::now();
        let task = Task::new(
            ScopeId::new("acme"),
            PipelineId::new("deploy"),
            BackendKind::Vm,
            PayloadRef::new("payload-2"),
        )
        .with_eligible_after(now + chrono::Duration::minutes(5));
        assert!(!task.is_dispatchable(now));
        assert!(task.is_dispatchable(now + chrono::Duration::minutes(6)));
    }
}
