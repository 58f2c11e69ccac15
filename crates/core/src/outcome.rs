//! Completion outcomes flowing in from executors and out to callers.

use serde::{Deserialize, Serialize};

use crate::id::TaskId;

/// Result a remote executor reports for a single task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// The remote execution completed successfully.
    Success,
    /// The remote execution failed; the reason is kept verbatim.
    Failure {
        /// Executor-reported failure reason
        reason: String,
    },
}

/// Terminal outcome delivered to the caller awaiting a task or chain.
///
/// A caller receives exactly one of these per correlation: success of the
/// chain tail, or the first failure anywhere in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainOutcome {
    /// The tail task (and therefore the whole chain) succeeded.
    Success {
        /// The task whose completion finished the chain
        task: TaskId,
    },
    /// A task failed, expired, or was cancelled.
    Failure {
        /// The first failing task
        task: TaskId,
        /// Failure reason, verbatim or derived
        reason: String,
    },
}

impl ChainOutcome {
    /// Task the outcome originated from.
    pub fn task(&self) -> TaskId {
        match self {
            Self::Success { task } => *task,
            Self::Failure { task, .. } => *task,
        }
    }
}
