//! JSON file store implementation.
//!
//! Stores each task as a `tasks/{id}.json` file under a root directory.
//! Writes go through a temp file plus rename so a crashed write never
//! leaves a torn record. Consistency of compare-and-set is per process: a
//! single advisory lock serializes mutations, which is enough for one
//! orchestrator embedding the store. Multi-process deployments need a real
//! database behind the [`TaskStore`] trait instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{ExecutionHandle, PipelineId, ScopeId, Task, TaskId, TaskStatus, Time};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::memory::apply_swap;
use super::{CasOutcome, Result, StatusChange, StoreError, TaskStore};

/// File-based JSON task store.
pub struct JsonStore {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonStore {
    /// Create a store rooted at `root`, creating the task directory.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("tasks")).await?;
        Ok(Self {
            root,
            lock: Arc::new(Mutex::new(())),
        })
    }

    fn task_path(&self, id: TaskId) -> PathBuf {
        self.root.join("tasks").join(format!("{}.json", id))
    }

    async fn read_task(&self, path: &Path) -> Result<Option<Task>> {
        match fs::read_to_string(path).await {
            Ok(s) => Ok(Some(serde_json::from_str(&s)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_task(&self, task: &Task) -> Result<()> {
        let path = self.task_path(task.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(task)?.as_bytes()).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Load every task in the store. The file backend has no indexes;
    /// queries scan.
    async fn load_all(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        let mut entries = fs::read_dir(self.root.join("tasks")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(task) = self.read_task(&path).await? {
                    tasks.push(task);
                }
            }
        }
        Ok(tasks)
    }
}

#[async_trait]
impl TaskStore for JsonStore {
    async fn save(&self, task: &Task) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write_task(task).await
    }

    async fn save_all(&self, tasks: &[Task]) -> Result<()> {
        let _guard = self.lock.lock().await;
        // Validate the whole batch before the first write.
        for task in tasks {
            if fs::try_exists(self.task_path(task.id)).await? {
                return Err(StoreError::Duplicate(task.id.to_string()));
            }
        }
        for task in tasks {
            self.write_task(task).await?;
        }
        debug!(count = tasks.len(), "saved task batch");
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        self.read_task(&self.task_path(id)).await
    }

    async fn compare_and_set_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        change: StatusChange,
    ) -> Result<CasOutcome> {
        let _guard = self.lock.lock().await;
        let mut task = self
            .read_task(&self.task_path(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let outcome = apply_swap(&mut task, expected, &change)?;
        if outcome.swapped() {
            self.write_task(&task).await?;
        }
        Ok(outcome)
    }

    async fn record_handle(&self, id: TaskId, handle: &ExecutionHandle) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut task = self
            .read_task(&self.task_path(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.handle = Some(handle.clone());
        task.last_updated_at = chrono::Utc::now();
        self.write_task(&task).await
    }

    async fn running_older_than(&self, scope: &ScopeId, cutoff: Time) -> Result<Vec<Task>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|t| {
                t.scope == *scope && t.status == TaskStatus::Running && t.last_updated_at < cutoff
            })
            .collect())
    }

    async fn by_status(&self, scope: &ScopeId, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|t| t.scope == *scope && t.status == status)
            .collect())
    }

    async fn count_active(&self, scope: &ScopeId, pipeline: &PipelineId) -> Result<usize> {
        Ok(self
            .load_all()
            .await?
            .iter()
            .filter(|t| t.scope == *scope && t.pipeline == *pipeline && t.is_active())
            .count())
    }

    async fn oldest_queued(
        &self,
        scope: &ScopeId,
        pipeline: &PipelineId,
        now: Time,
    ) -> Result<Option<Task>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|t| t.scope == *scope && t.pipeline == *pipeline && t.is_dispatchable(now))
            .min_by_key(|t| (t.created_at, t.id.to_string())))
    }
}
