//! Remote executor boundary.
//!
//! Tasks are executed by pluggable backends behind the [`RemoteExecutor`]
//! trait; dispatch selects an implementation from a registry keyed by
//! backend tag.

#![warn(missing_docs)]

pub mod executor;
pub mod registry;
pub mod loopback;

pub use executor::{ExecutorError, RemoteExecutor};
pub use registry::ExecutorRegistry;
pub use loopback::LoopbackExecutor;
