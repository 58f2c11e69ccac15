//! Task store abstraction and implementations for Relay.
//!
//! This crate provides the trait-based task store interface with an
//! in-memory reference implementation and a JSON-file backend.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
#[cfg(feature = "json")]
pub mod json_storage;

pub use trait_::{CasOutcome, Result, StatusChange, StoreError, TaskStore};
pub use memory::MemoryStore;
#[cfg(feature = "json")]
pub use json_storage::JsonStore;
