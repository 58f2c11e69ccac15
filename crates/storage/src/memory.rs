//! In-memory task store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{ExecutionHandle, PipelineId, ScopeId, Task, TaskId, TaskStatus, Time};
use tokio::sync::Mutex;
use tracing::debug;

use super::{CasOutcome, Result, StatusChange, StoreError, TaskStore};

/// In-memory task store.
///
/// Reference implementation of the [`TaskStore`] contract; the engine's
/// test suites run against it. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tasks: Arc<Mutex<HashMap<TaskId, Task>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks held, regardless of status.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Whether the store holds no tasks.
    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}

/// Apply a compare-and-set to a task record in place.
///
/// Shared by the store backends so the absorbing-terminal and
/// attempts-counting rules cannot drift between them.
pub(crate) fn apply_swap(
    task: &mut Task,
    expected: TaskStatus,
    change: &StatusChange,
) -> Result<CasOutcome> {
    if task.status != expected || task.status.is_terminal() {
        return Ok(CasOutcome::Conflict {
            actual: task.status,
        });
    }
    if !expected.can_transition_to(change.status) {
        return Err(StoreError::IllegalTransition {
            from: expected,
            to: change.status,
        });
    }

    task.status = change.status;
    task.failure_reason = change.reason.clone();
    task.last_updated_at = chrono::Utc::now();
    if change.status == TaskStatus::Running {
        task.attempts += 1;
    }
    Ok(CasOutcome::Swapped(task.clone()))
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn save(&self, task: &Task) -> Result<()> {
        self.tasks.lock().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn save_all(&self, tasks: &[Task]) -> Result<()> {
        let mut map = self.tasks.lock().await;
        // Validate the whole batch before touching the map.
        for task in tasks {
            if map.contains_key(&task.id) {
                return Err(StoreError::Duplicate(task.id.to_string()));
            }
        }
        for task in tasks {
            map.insert(task.id, task.clone());
        }
        debug!(count = tasks.len(), "saved task batch");
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.lock().await.get(&id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        change: StatusChange,
    ) -> Result<CasOutcome> {
        let mut map = self.tasks.lock().await;
        let task = map
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        apply_swap(task, expected, &change)
    }

    async fn record_handle(&self, id: TaskId, handle: &ExecutionHandle) -> Result<()> {
        let mut map = self.tasks.lock().await;
        let task = map
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.handle = Some(handle.clone());
        task.last_updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn running_older_than(&self, scope: &ScopeId, cutoff: Time) -> Result<Vec<Task>> {
        let map = self.tasks.lock().await;
        Ok(map
            .values()
            .filter(|t| {
                t.scope == *scope && t.status == TaskStatus::Running && t.last_updated_at < cutoff
            })
            .cloned()
            .collect())
    }

    async fn by_status(&self, scope: &ScopeId, status: TaskStatus) -> Result<Vec<Task>> {
        let map = self.tasks.lock().await;
        Ok(map
            .values()
            .filter(|t| t.scope == *scope && t.status == status)
            .cloned()
            .collect())
    }

    async fn count_active(&self, scope: &ScopeId, pipeline: &PipelineId) -> Result<usize> {
        let map = self.tasks.lock().await;
        Ok(map
            .values()
            .filter(|t| t.scope == *scope && t.pipeline == *pipeline && t.is_active())
            .count())
    }

    async fn oldest_queued(
        &self,
        scope: &ScopeId,
        pipeline: &PipelineId,
        now: Time,
    ) -> Result<Option<Task>> {
        let map = self.tasks.lock().await;
        Ok(map
            .values()
            .filter(|t| t.scope == *scope && t.pipeline == *pipeline && t.is_dispatchable(now))
            .min_by_key(|t| (t.created_at, t.id.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{BackendKind, PayloadRef};

    fn task() -> Task {
        Task::new(
            ScopeId::new("acme"),
            PipelineId::new("deploy"),
            BackendKind::Container,
            PayloadRef::new("payload"),
        )
    }

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let store = MemoryStore::new();
        let t = task();
        store.save(&t).await.unwrap();
        let loaded = store.get(t.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, t.id);
        assert_eq!(loaded.status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn cas_swaps_on_match_and_bumps_timestamp() {
        let store = MemoryStore::new();
        let t = task();
        store.save(&t).await.unwrap();

        let outcome = store
            .compare_and_set_status(t.id, TaskStatus::Queued, StatusChange::to(TaskStatus::Running))
            .await
            .unwrap();
        let CasOutcome::Swapped(updated) = outcome else {
            panic!("expected swap");
        };
        assert_eq!(updated.status, TaskStatus::Running);
        assert_eq!(updated.attempts, 1);
        assert!(updated.last_updated_at >= t.last_updated_at);
    }

    #[tokio::test]
    async fn cas_conflicts_on_mismatch() {
        let store = MemoryStore::new();
        let t = task();
        store.save(&t).await.unwrap();

        let outcome = store
            .compare_and_set_status(t.id, TaskStatus::Waiting, StatusChange::to(TaskStatus::Queued))
            .await
            .unwrap();
        match outcome {
            CasOutcome::Conflict { actual } => assert_eq!(actual, TaskStatus::Queued),
            CasOutcome::Swapped(_) => panic!("expected conflict"),
        }
    }

    #[tokio::test]
    async fn terminal_status_is_absorbing() {
        let store = MemoryStore::new();
        let mut t = task();
        t.status = TaskStatus::Running;
        store.save(&t).await.unwrap();

        store
            .compare_and_set_status(t.id, TaskStatus::Running, StatusChange::failed("boom"))
            .await
            .unwrap();

        // Even a matching expectation cannot leave a terminal status.
        let outcome = store
            .compare_and_set_status(t.id, TaskStatus::Failed, StatusChange::to(TaskStatus::Queued))
            .await
            .unwrap();
        assert!(!outcome.swapped());
        let stored = store.get(t.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn illegal_transition_is_an_error() {
        let store = MemoryStore::new();
        let mut t = task();
        t.status = TaskStatus::Running;
        store.save(&t).await.unwrap();

        let err = store
            .compare_and_set_status(t.id, TaskStatus::Running, StatusChange::to(TaskStatus::Queued))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn save_all_is_all_or_nothing() {
        let store = MemoryStore::new();
        let existing = task();
        store.save(&existing).await.unwrap();

        let fresh = task();
        let err = store
            .save_all(&[fresh.clone(), existing.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        // The fresh task must not have leaked in.
        assert!(store.get(fresh.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn count_active_counts_queued_and_running_only() {
        let store = MemoryStore::new();
        let scope = ScopeId::new("acme");
        let pipeline = PipelineId::new("deploy");

        for status in [
            TaskStatus::Queued,
            TaskStatus::Running,
            TaskStatus::Waiting,
            TaskStatus::Success,
            TaskStatus::Failed,
        ] {
            let mut t = task();
            t.status = status;
            store.save(&t).await.unwrap();
        }

        assert_eq!(store.count_active(&scope, &pipeline).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn oldest_queued_respects_order_and_eligibility() {
        let store = MemoryStore::new();
        let scope = ScopeId::new("acme");
        let pipeline = PipelineId::new("deploy");
        let now = chrono::Utc::now();

        let mut first = task();
        first.created_at = now - chrono::Duration::minutes(10);
        let mut second = task();
        second.created_at = now - chrono::Duration::minutes(5);
        let mut delayed = task();
        delayed.created_at = now - chrono::Duration::minutes(20);
        delayed.eligible_after = Some(now + chrono::Duration::minutes(30));

        for t in [&first, &second, &delayed] {
            store.save(t).await.unwrap();
        }

        let picked = store
            .oldest_queued(&scope, &pipeline, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, first.id);
    }

    #[tokio::test]
    async fn running_older_than_filters_by_staleness() {
        let store = MemoryStore::new();
        let scope = ScopeId::new("acme");
        let now = chrono::Utc::now();

        let mut stale = task();
        stale.status = TaskStatus::Running;
        stale.last_updated_at = now - chrono::Duration::minutes(30);
        let mut fresh = task();
        fresh.status = TaskStatus::Running;

        store.save(&stale).await.unwrap();
        store.save(&fresh).await.unwrap();

        let found = store
            .running_older_than(&scope, now - chrono::Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, stale.id);
    }
}
