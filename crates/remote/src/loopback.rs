//! In-process loopback executor.
//!
//! Records submissions instead of running anything; tests and embedders
//! drive completions by hand through the resolver. With a capacity bound it
//! also exercises the dispatch rejection path.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{BackendKind, ExecutionHandle, PayloadRef};
use tokio::sync::Mutex;
use tracing::debug;

use crate::executor::{ExecutorError, RemoteExecutor};

#[derive(Default)]
struct LoopbackState {
    seq: u64,
    in_flight: Vec<(String, PayloadRef)>,
    aborted: Vec<String>,
}

/// Executor that accepts submissions without executing them.
pub struct LoopbackExecutor {
    backend: BackendKind,
    capacity: Option<usize>,
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackExecutor {
    /// Create an unbounded loopback executor for the given backend tag.
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            capacity: None,
            state: Arc::new(Mutex::new(LoopbackState::default())),
        }
    }

    /// Bound in-flight capacity; submissions beyond it are rejected.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Tokens currently in flight, in submission order.
    pub async fn in_flight(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .in_flight
            .iter()
            .map(|(token, _)| token.clone())
            .collect()
    }

    /// Tokens whose abort was requested.
    pub async fn aborted(&self) -> Vec<String> {
        self.state.lock().await.aborted.clone()
    }

    /// Mark an execution finished, freeing its capacity slot. Returns the
    /// payload it was submitted with, if the token was in flight.
    pub async fn finish(&self, token: &str) -> Option<PayloadRef> {
        let mut state = self.state.lock().await;
        let pos = state.in_flight.iter().position(|(t, _)| t == token)?;
        Some(state.in_flight.remove(pos).1)
    }
}

#[async_trait]
impl RemoteExecutor for LoopbackExecutor {
    async fn submit(&self, payload: &PayloadRef) -> Result<ExecutionHandle, ExecutorError> {
        let mut state = self.state.lock().await;
        if let Some(capacity) = self.capacity {
            if state.in_flight.len() >= capacity {
                return Err(ExecutorError::Rejected(format!(
                    "loopback capacity {} reached",
                    capacity
                )));
            }
        }
        state.seq += 1;
        let token = format!("loopback-{}", state.seq);
        state.in_flight.push((token.clone(), payload.clone()));
        debug!(%token, %payload, "loopback submit");
        Ok(ExecutionHandle::new(self.backend, token))
    }

    async fn abort(&self, handle: &ExecutionHandle) -> Result<(), ExecutorError> {
        let mut state = self.state.lock().await;
        if let Some(pos) = state
            .in_flight
            .iter()
            .position(|(token, _)| *token == handle.token)
        {
            state.in_flight.remove(pos);
        }
        state.aborted.push(handle.token.clone());
        debug!(token = %handle.token, "loopback abort");
        Ok(())
    }
}
