//! Completion resolution.
//!
//! Receives remote results, applies the terminal transition, advances or
//! cascades the chain, and resumes the awaiting caller. This is the only
//! writer that moves a task out of `Running`.

use std::sync::Arc;

use relay_core::{
    ChainOutcome, Task, TaskId, TaskOutcome, TaskStatus, REASON_PREDECESSOR_FAILED,
};
use relay_storage::{CasOutcome, StatusChange, TaskStore};
use tracing::{debug, info, warn};

use crate::chain::ChainScheduler;
use crate::error::EngineError;
use crate::notify::CallerNotifier;

/// Result of a resolve call.
#[derive(Debug)]
pub enum Resolution {
    /// The terminal transition was applied; carries the updated task.
    Completed(Task),
    /// The task was already terminal: remote executors redeliver, so a
    /// duplicate completion is a logged no-op, never an error.
    Duplicate,
}

impl Resolution {
    /// Whether this call applied the transition.
    pub fn completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Applies remote outcomes to tasks and resumes callers.
#[derive(Clone)]
pub struct CompletionResolver {
    store: Arc<dyn TaskStore>,
    scheduler: ChainScheduler,
    notifier: Arc<dyn CallerNotifier>,
}

impl CompletionResolver {
    /// Create a resolver.
    pub fn new(store: Arc<dyn TaskStore>, notifier: Arc<dyn CallerNotifier>) -> Self {
        let scheduler = ChainScheduler::new(store.clone());
        Self {
            store,
            scheduler,
            notifier,
        }
    }

    /// Resolve a remote outcome for a task.
    ///
    /// The task must be `Running`. Already-terminal tasks are duplicates
    /// and no-op; any other status is a protocol violation. Exactly one of
    /// two concurrent resolves wins the status swap, and only the winner
    /// advances the chain or notifies the caller.
    pub async fn resolve(&self, id: TaskId, outcome: TaskOutcome) -> Result<Resolution, EngineError> {
        let task = self
            .store
            .get(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;

        if task.is_terminal() {
            debug!(task = %id, status = %task.status, "duplicate completion ignored");
            return Ok(Resolution::Duplicate);
        }
        if task.status != TaskStatus::Running {
            return Err(EngineError::InvalidState {
                task: id,
                expected: TaskStatus::Running,
                actual: task.status,
            });
        }

        match outcome {
            TaskOutcome::Success => self.resolve_success(id).await,
            TaskOutcome::Failure { reason } => self.resolve_failure(id, reason).await,
        }
    }

    async fn resolve_success(&self, id: TaskId) -> Result<Resolution, EngineError> {
        let swapped = self
            .store
            .compare_and_set_status(id, TaskStatus::Running, StatusChange::to(TaskStatus::Success))
            .await?;
        let updated = match swapped {
            CasOutcome::Swapped(task) => task,
            CasOutcome::Conflict { actual } => {
                debug!(task = %id, %actual, "success resolution raced; ignoring");
                return Ok(Resolution::Duplicate);
            }
        };

        info!(task = %id, "task succeeded");
        self.scheduler.advance_chain(&updated).await?;

        // Only the chain tail resumes the caller on success.
        if updated.next_task.is_none() {
            self.notify_caller(&updated, ChainOutcome::Success { task: id }).await;
        }
        Ok(Resolution::Completed(updated))
    }

    async fn resolve_failure(&self, id: TaskId, reason: String) -> Result<Resolution, EngineError> {
        let swapped = self
            .store
            .compare_and_set_status(id, TaskStatus::Running, StatusChange::failed(reason.clone()))
            .await?;
        let updated = match swapped {
            CasOutcome::Swapped(task) => task,
            CasOutcome::Conflict { actual } => {
                debug!(task = %id, %actual, "failure resolution raced; ignoring");
                return Ok(Resolution::Duplicate);
            }
        };

        info!(task = %id, %reason, "task failed");
        self.fail_dependents(&updated, REASON_PREDECESSOR_FAILED).await?;
        self.notify_caller(&updated, ChainOutcome::Failure { task: id, reason }).await;
        Ok(Resolution::Completed(updated))
    }

    /// Cascade a terminal failure to every not-yet-started descendant.
    ///
    /// Each descendant still in `Waiting`/`Queued` becomes `Failed` with
    /// the derived reason. Descendants that raced into `Running` or a
    /// terminal state are left alone. Cascaded links never notify: the
    /// caller hears about the first failure only.
    pub(crate) async fn fail_dependents(
        &self,
        from: &Task,
        derived_reason: &str,
    ) -> Result<(), EngineError> {
        let mut cursor = from.next_task;
        while let Some(id) = cursor {
            let Some(task) = self.store.get(id).await? else {
                warn!(task = %id, "chain pointer to missing task; cascade stops");
                break;
            };
            cursor = task.next_task;

            if matches!(task.status, TaskStatus::Waiting | TaskStatus::Queued) {
                match self
                    .store
                    .compare_and_set_status(id, task.status, StatusChange::failed(derived_reason))
                    .await?
                {
                    CasOutcome::Swapped(_) => debug!(task = %id, "cascaded failure"),
                    CasOutcome::Conflict { actual } => {
                        debug!(task = %id, %actual, "cascade target moved; skipped")
                    }
                }
            }
        }
        Ok(())
    }

    /// Resume the awaiting caller, if the task carries a correlation.
    ///
    /// Runs after every store transition is committed; the notifier may
    /// block on I/O but holds nothing. Failures are logged: the channel
    /// is at-least-once and the core never blocks on acknowledgement.
    pub(crate) async fn notify_caller(&self, task: &Task, outcome: ChainOutcome) {
        let Some(correlation) = &task.correlation else {
            return;
        };
        if let Err(e) = self.notifier.notify(correlation, &outcome).await {
            warn!(task = %task.id, %correlation, error = %e, "caller notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelNotifier;
    use relay_core::{BackendKind, CorrelationId, PayloadRef, PipelineId, ScopeId};
    use relay_storage::MemoryStore;
    use tokio::sync::mpsc::UnboundedReceiver;

    type Notifications = UnboundedReceiver<(CorrelationId, ChainOutcome)>;

    fn task() -> Task {
        Task::new(
            ScopeId::new("acme"),
            PipelineId::new("deploy"),
            BackendKind::Container,
            PayloadRef::new("payload"),
        )
    }

    fn resolver() -> (CompletionResolver, Arc<MemoryStore>, Notifications) {
        let store = Arc::new(MemoryStore::new());
        let (notifier, rx) = ChannelNotifier::new();
        let resolver = CompletionResolver::new(store.clone(), Arc::new(notifier));
        (resolver, store, rx)
    }

    async fn running_task(store: &MemoryStore) -> Task {
        let mut t = task().with_correlation(CorrelationId::new("caller-1"));
        t.status = TaskStatus::Running;
        store.save(&t).await.unwrap();
        t
    }

    #[tokio::test]
    async fn success_persists_and_notifies_tail() {
        let (resolver, store, mut rx) = resolver();
        let t = running_task(&store).await;

        let resolution = resolver.resolve(t.id, TaskOutcome::Success).await.unwrap();
        assert!(resolution.completed());
        assert_eq!(
            store.get(t.id).await.unwrap().unwrap().status,
            TaskStatus::Success
        );

        let (_, outcome) = rx.try_recv().unwrap();
        assert_eq!(outcome, ChainOutcome::Success { task: t.id });
    }

    #[tokio::test]
    async fn failure_keeps_reason_verbatim() {
        let (resolver, store, mut rx) = resolver();
        let t = running_task(&store).await;

        resolver
            .resolve(
                t.id,
                TaskOutcome::Failure {
                    reason: "socket timeout".into(),
                },
            )
            .await
            .unwrap();

        let stored = store.get(t.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("socket timeout"));

        let (_, outcome) = rx.try_recv().unwrap();
        assert_eq!(
            outcome,
            ChainOutcome::Failure {
                task: t.id,
                reason: "socket timeout".into()
            }
        );
    }

    #[tokio::test]
    async fn duplicate_resolution_is_a_noop() {
        let (resolver, store, mut rx) = resolver();
        let t = running_task(&store).await;

        resolver.resolve(t.id, TaskOutcome::Success).await.unwrap();
        let second = resolver
            .resolve(
                t.id,
                TaskOutcome::Failure {
                    reason: "late failure".into(),
                },
            )
            .await
            .unwrap();

        assert!(matches!(second, Resolution::Duplicate));
        let stored = store.get(t.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Success);
        assert!(stored.failure_reason.is_none());

        // Exactly one notification fired.
        rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn concurrent_resolves_settle_once() {
        let (resolver, store, mut rx) = resolver();
        let t = running_task(&store).await;

        let (a, b) = tokio::join!(
            resolver.resolve(t.id, TaskOutcome::Success),
            resolver.resolve(
                t.id,
                TaskOutcome::Failure {
                    reason: "raced".into()
                }
            ),
        );

        let winners = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|r| r.completed())
            .count();
        assert_eq!(winners, 1);

        rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn resolving_a_waiting_task_is_invalid() {
        let (resolver, store, _rx) = resolver();
        let mut t = task();
        t.status = TaskStatus::Waiting;
        store.save(&t).await.unwrap();

        let err = resolver.resolve(t.id, TaskOutcome::Success).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn failure_cascades_to_waiting_descendants() {
        let (resolver, store, mut rx) = resolver();

        // Chain: head (Running) -> mid (Waiting) -> tail (Waiting).
        let mut tail = task().with_correlation(CorrelationId::new("caller-1"));
        tail.status = TaskStatus::Waiting;
        let mut mid = task().with_correlation(CorrelationId::new("caller-1"));
        mid.status = TaskStatus::Waiting;
        mid.next_task = Some(tail.id);
        let mut head = task().with_correlation(CorrelationId::new("caller-1"));
        head.status = TaskStatus::Running;
        head.next_task = Some(mid.id);
        for t in [&head, &mid, &tail] {
            store.save(t).await.unwrap();
        }

        resolver
            .resolve(
                head.id,
                TaskOutcome::Failure {
                    reason: "exploded".into(),
                },
            )
            .await
            .unwrap();

        for id in [mid.id, tail.id] {
            let t = store.get(id).await.unwrap().unwrap();
            assert_eq!(t.status, TaskStatus::Failed);
            assert_eq!(t.failure_reason.as_deref(), Some(REASON_PREDECESSOR_FAILED));
        }

        // One notification, from the failing link itself.
        let (_, outcome) = rx.try_recv().unwrap();
        assert_eq!(
            outcome,
            ChainOutcome::Failure {
                task: head.id,
                reason: "exploded".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn intermediate_success_advances_without_notifying() {
        let (resolver, store, mut rx) = resolver();

        let mut tail = task().with_correlation(CorrelationId::new("caller-1"));
        tail.status = TaskStatus::Waiting;
        let mut head = task().with_correlation(CorrelationId::new("caller-1"));
        head.status = TaskStatus::Running;
        head.next_task = Some(tail.id);
        for t in [&head, &tail] {
            store.save(t).await.unwrap();
        }

        resolver.resolve(head.id, TaskOutcome::Success).await.unwrap();

        assert_eq!(
            store.get(tail.id).await.unwrap().unwrap().status,
            TaskStatus::Queued
        );
        assert!(rx.try_recv().is_err());
    }
}
