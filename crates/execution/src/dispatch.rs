//! Task dispatch.
//!
//! Hands queued tasks to their backend executor and commits the
//! `Queued -> Running` transition. The status compare-and-swap is what
//! serializes concurrent dispatchers: at most one dispatch of a task ever
//! commits. No store lock is held across the network call.

use std::sync::Arc;

use relay_core::{
    ChainOutcome, PipelineId, ScopeId, Task, TaskId, TaskOutcome, TaskStatus,
    REASON_CANCELLED, REASON_PREDECESSOR_FAILED,
};
use relay_remote::ExecutorRegistry;
use relay_storage::{CasOutcome, StatusChange, TaskStore};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::resolver::CompletionResolver;

/// Result of a dispatch attempt.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The transition committed; carries the running task with its handle.
    Dispatched(Task),
    /// The backend refused for capacity. The task never left `Queued`; a
    /// later scheduling pass retries. Absorbed, not surfaced to the caller.
    Rejected,
    /// Another dispatcher committed first; our submission was aborted.
    Lost,
}

/// Dispatches queued tasks to remote executors.
#[derive(Clone)]
pub struct DispatchEngine {
    store: Arc<dyn TaskStore>,
    registry: ExecutorRegistry,
    resolver: CompletionResolver,
}

impl DispatchEngine {
    /// Create a dispatch engine.
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: ExecutorRegistry,
        resolver: CompletionResolver,
    ) -> Self {
        Self {
            store,
            registry,
            resolver,
        }
    }

    /// Dispatch a queued task to its backend.
    ///
    /// Submission happens before the status commit, so a capacity
    /// rejection leaves the task `Queued`, the one permitted cycle in the
    /// state machine. If the commit is then lost to a concurrent
    /// dispatcher, our submission is aborted best-effort; a completion the
    /// zombie execution still delivers is dropped by resolver idempotence.
    pub async fn dispatch(&self, task: &Task) -> Result<DispatchOutcome, EngineError> {
        if task.status != TaskStatus::Queued {
            return Err(EngineError::InvalidState {
                task: task.id,
                expected: TaskStatus::Queued,
                actual: task.status,
            });
        }
        let executor = self
            .registry
            .get(task.backend)
            .ok_or(EngineError::UnknownBackend(task.backend))?;

        let handle = match executor.submit(&task.payload).await {
            Ok(handle) => handle,
            Err(e) if e.is_rejection() => {
                warn!(task = %task.id, backend = %task.backend, error = %e, "dispatch rejected; task stays queued");
                return Ok(DispatchOutcome::Rejected);
            }
            Err(e) => return Err(e.into()),
        };

        match self
            .store
            .compare_and_set_status(task.id, TaskStatus::Queued, StatusChange::to(TaskStatus::Running))
            .await?
        {
            CasOutcome::Swapped(mut updated) => {
                self.store.record_handle(task.id, &handle).await?;
                updated.handle = Some(handle);
                info!(task = %updated.id, backend = %updated.backend, attempt = updated.attempts, "task dispatched");
                Ok(DispatchOutcome::Dispatched(updated))
            }
            CasOutcome::Conflict { actual } => {
                debug!(task = %task.id, %actual, "dispatch lost the race; reverting submission");
                if let Err(e) = executor.abort(&handle).await {
                    warn!(task = %task.id, error = %e, "revert abort failed");
                }
                Ok(DispatchOutcome::Lost)
            }
        }
    }

    /// Scheduling-pass helper: dispatch the oldest eligible queued task
    /// for the scope+pipeline pair, if there is one.
    pub async fn dispatch_next(
        &self,
        scope: &ScopeId,
        pipeline: &PipelineId,
    ) -> Result<Option<DispatchOutcome>, EngineError> {
        let now = chrono::Utc::now();
        match self.store.oldest_queued(scope, pipeline, now).await? {
            Some(task) => Ok(Some(self.dispatch(&task).await?)),
            None => Ok(None),
        }
    }

    /// Cancel a `Queued` or `Running` task on the caller's request.
    ///
    /// Requests remote abort best-effort and marks the task `Failed` with
    /// reason "cancelled", cascading to dependents and notifying the
    /// caller like any other failure. Cancelling an already-terminal task
    /// is a no-op.
    pub async fn cancel(&self, id: TaskId) -> Result<(), EngineError> {
        let task = self.store.get(id).await?.ok_or(EngineError::NotFound(id))?;

        if task.is_terminal() {
            debug!(task = %id, status = %task.status, "cancel of terminal task is a no-op");
            return Ok(());
        }

        match task.status {
            TaskStatus::Queued => {
                match self
                    .store
                    .compare_and_set_status(
                        id,
                        TaskStatus::Queued,
                        StatusChange::failed(REASON_CANCELLED),
                    )
                    .await?
                {
                    CasOutcome::Swapped(updated) => {
                        info!(task = %id, "queued task cancelled");
                        self.resolver
                            .fail_dependents(&updated, REASON_PREDECESSOR_FAILED)
                            .await?;
                        self.resolver
                            .notify_caller(
                                &updated,
                                ChainOutcome::Failure {
                                    task: id,
                                    reason: REASON_CANCELLED.into(),
                                },
                            )
                            .await;
                        Ok(())
                    }
                    CasOutcome::Conflict { actual } if actual == TaskStatus::Running => {
                        // Dispatched while we were cancelling.
                        self.cancel_running(id).await
                    }
                    CasOutcome::Conflict { actual } => {
                        debug!(task = %id, %actual, "cancel raced with terminal transition");
                        Ok(())
                    }
                }
            }
            TaskStatus::Running => self.cancel_running(id).await,
            // Waiting links are cancelled through their chain's active
            // task; terminal statuses returned above.
            _ => Err(EngineError::InvalidState {
                task: id,
                expected: TaskStatus::Queued,
                actual: task.status,
            }),
        }
    }

    async fn cancel_running(&self, id: TaskId) -> Result<(), EngineError> {
        // Re-read: the handle is recorded just after the Running commit.
        let task = self.store.get(id).await?.ok_or(EngineError::NotFound(id))?;

        if let Some(handle) = &task.handle {
            match self.registry.get(handle.backend) {
                Some(executor) => {
                    if let Err(e) = executor.abort(handle).await {
                        warn!(task = %id, error = %e, "remote abort failed; cancelling anyway");
                    }
                }
                None => warn!(task = %id, backend = %handle.backend, "no executor for recorded handle"),
            }
        }

        self.resolver
            .resolve(
                id,
                TaskOutcome::Failure {
                    reason: REASON_CANCELLED.into(),
                },
            )
            .await?;
        info!(task = %id, "running task cancelled");
        Ok(())
    }
}
