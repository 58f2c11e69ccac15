//! Relay core data models.
//!
//! This crate defines the task, tier, and outcome types shared by the
//! orchestration components.

#![warn(missing_docs)]

// Core identities
mod id;

// Task lifecycle
mod task;
mod chain;

// Admission
mod tier;

// Completion and caller resumption
mod outcome;

// Re-exports
pub use id::*;

pub use task::{
    BackendKind, ExecutionHandle, Task, TaskStatus,
    REASON_CANCELLED, REASON_PREDECESSOR_FAILED, REASON_PREDECESSOR_TIMED_OUT, REASON_TIMED_OUT,
};
pub use chain::chain_status;
pub use tier::{AdmissionTicket, ConcurrencyLimit, Tier};
pub use outcome::{ChainOutcome, TaskOutcome};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
