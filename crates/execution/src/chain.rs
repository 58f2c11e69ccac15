//! Chain scheduling.
//!
//! Chains are ordered task sequences linked by `next_task`. Within a chain
//! at most one task is ever `Queued` or `Running`; every other link is
//! `Waiting` behind its predecessor or already terminal.

use std::sync::Arc;

use relay_core::{Task, TaskId, TaskStatus};
use relay_storage::{CasOutcome, StatusChange, TaskStore};
use tracing::{debug, info};

use crate::error::EngineError;

/// Handle to an enqueued chain.
#[derive(Debug, Clone)]
pub struct ChainHandle {
    /// First task; starts `Queued`.
    pub head: TaskId,
    /// Last task; its outcome stands for the chain.
    pub tail: TaskId,
    /// Every task in chain order.
    pub tasks: Vec<TaskId>,
}

/// Builds chains and advances them as links complete.
#[derive(Clone)]
pub struct ChainScheduler {
    store: Arc<dyn TaskStore>,
}

impl ChainScheduler {
    /// Create a scheduler.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Enqueue a single, unchained task.
    pub async fn enqueue_task(&self, task: Task) -> Result<Task, EngineError> {
        Self::ensure_fresh(&task)?;
        self.store.save(&task).await?;
        info!(task = %task.id, scope = %task.scope, "task enqueued");
        Ok(task)
    }

    /// Enqueue an ordered sequence as a chain.
    ///
    /// Links every task to its successor, demotes all non-head tasks to
    /// `Waiting`, and persists the whole chain atomically: either every
    /// link is visible to the store or the call fails with no partial
    /// chain observable. The head's correlation is propagated to links
    /// without their own, so the awaiting caller hears about a failure in
    /// any link.
    pub async fn enqueue_sequential(&self, mut tasks: Vec<Task>) -> Result<ChainHandle, EngineError> {
        if tasks.is_empty() {
            return Err(EngineError::EmptyChain);
        }
        for task in &tasks {
            Self::ensure_fresh(task)?;
        }

        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        let correlation = tasks[0].correlation.clone();
        for (i, task) in tasks.iter_mut().enumerate() {
            if i + 1 < ids.len() {
                task.next_task = Some(ids[i + 1]);
            }
            if i > 0 {
                task.status = TaskStatus::Waiting;
                // Every link must be able to resume the caller: a failure
                // anywhere in the chain notifies from the failing link.
                if task.correlation.is_none() {
                    task.correlation = correlation.clone();
                }
            }
        }

        self.store.save_all(&tasks).await?;
        info!(head = %ids[0], links = ids.len(), "chain enqueued");
        Ok(ChainHandle {
            head: ids[0],
            tail: ids[ids.len() - 1],
            tasks: ids,
        })
    }

    /// Advance the chain past a successfully completed link.
    ///
    /// Moves the successor `Waiting -> Queued`, making it eligible for
    /// dispatch. No-op when the completed task is not `Success`, has no
    /// successor, or another writer already moved the successor (a raced
    /// advance or a cascade).
    pub async fn advance_chain(&self, completed: &Task) -> Result<Option<TaskId>, EngineError> {
        if completed.status != TaskStatus::Success {
            return Ok(None);
        }
        let Some(next) = completed.next_task else {
            return Ok(None);
        };

        match self
            .store
            .compare_and_set_status(next, TaskStatus::Waiting, StatusChange::to(TaskStatus::Queued))
            .await?
        {
            CasOutcome::Swapped(_) => {
                debug!(completed = %completed.id, next = %next, "chain advanced");
                Ok(Some(next))
            }
            CasOutcome::Conflict { actual } => {
                debug!(next = %next, %actual, "chain advance raced; leaving as-is");
                Ok(None)
            }
        }
    }

    /// Derive the chain's overall status from its current task records.
    ///
    /// The earliest non-terminal link's status, or the tail's outcome once
    /// every link is terminal.
    pub async fn status(&self, handle: &ChainHandle) -> Result<TaskStatus, EngineError> {
        let mut tasks = Vec::with_capacity(handle.tasks.len());
        for id in &handle.tasks {
            let task = self
                .store
                .get(*id)
                .await?
                .ok_or(EngineError::NotFound(*id))?;
            tasks.push(task);
        }
        Ok(relay_core::chain_status(&tasks))
    }

    fn ensure_fresh(task: &Task) -> Result<(), EngineError> {
        if task.next_task.is_some() || task.status != TaskStatus::Queued {
            return Err(EngineError::AlreadyChained(task.id));
        }
        Ok(())
    }
}
