//! Orchestration engine - admission, chaining, dispatch, completion, and
//! reaping for remotely executed tasks.
//!
//! The engine is a library-level contract: callers enqueue tasks or chains,
//! a scheduling pass dispatches queued work to executor backends, remote
//! results come back through the resolver, and a periodic reaper sweep
//! expires anything stuck. Every status transition goes through the task
//! store's compare-and-swap, which is what keeps concurrent writers from
//! double-dispatching or double-resolving.

#![warn(missing_docs)]

pub mod error;
pub mod admission;
pub mod chain;
pub mod dispatch;
pub mod resolver;
pub mod reaper;
pub mod notify;

pub use error::EngineError;
pub use admission::{AdmissionController, PolicyError, StaticTierPolicy, TierPolicy};
pub use chain::{ChainHandle, ChainScheduler};
pub use dispatch::{DispatchEngine, DispatchOutcome};
pub use resolver::{CompletionResolver, Resolution};
pub use reaper::{ReapReport, Reaper, ReaperConfig};
pub use notify::{CallerNotifier, ChannelNotifier, WebhookNotifier};
