//! Stale-task reaping.
//!
//! Tasks have no per-task timeout timer; a periodic sweep force-fails any
//! `Running` task whose last update is older than the timeout. Worst-case
//! detection latency is therefore the sweep interval, which an external
//! scheduler owns.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{ChainOutcome, ScopeId, TaskId, REASON_PREDECESSOR_TIMED_OUT, REASON_TIMED_OUT};
use relay_storage::{CasOutcome, StatusChange, TaskStore};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::resolver::CompletionResolver;

/// Reaper configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    /// Staleness threshold for `Running` tasks.
    pub timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl ReaperConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the staleness threshold.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of one reap sweep.
#[derive(Debug, Default)]
pub struct ReapReport {
    /// Tasks transitioned to `Expired` this sweep.
    pub expired: Vec<TaskId>,
    /// Stale candidates that completed before the sweep reached them.
    pub skipped: usize,
}

/// Force-fails tasks stuck in `Running` past the timeout.
#[derive(Clone)]
pub struct Reaper {
    store: Arc<dyn TaskStore>,
    resolver: CompletionResolver,
    config: ReaperConfig,
}

impl Reaper {
    /// Create a reaper with the default 15 minute timeout.
    pub fn new(store: Arc<dyn TaskStore>, resolver: CompletionResolver) -> Self {
        Self {
            store,
            resolver,
            config: ReaperConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ReaperConfig) -> Self {
        self.config = config;
        self
    }

    /// Sweep one scope.
    ///
    /// The sweep is not one transaction, but each task's `Expired`
    /// transition is atomic with its cascade: a task is never left expired
    /// with its dependents untouched.
    pub async fn reap(&self, scope: &ScopeId) -> Result<ReapReport, EngineError> {
        let delta = chrono::Duration::from_std(self.config.timeout)
            .unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = chrono::Utc::now().checked_sub_signed(delta) else {
            return Ok(ReapReport::default());
        };

        let stale = self.store.running_older_than(scope, cutoff).await?;
        let mut report = ReapReport::default();

        for task in stale {
            match self
                .store
                .compare_and_set_status(
                    task.id,
                    relay_core::TaskStatus::Running,
                    StatusChange::expired(REASON_TIMED_OUT),
                )
                .await?
            {
                CasOutcome::Swapped(expired) => {
                    warn!(task = %expired.id, scope = %scope, "task expired by reaper");
                    self.resolver
                        .fail_dependents(&expired, REASON_PREDECESSOR_TIMED_OUT)
                        .await?;
                    self.resolver
                        .notify_caller(
                            &expired,
                            ChainOutcome::Failure {
                                task: expired.id,
                                reason: REASON_TIMED_OUT.into(),
                            },
                        )
                        .await;
                    report.expired.push(expired.id);
                }
                CasOutcome::Conflict { actual } => {
                    debug!(task = %task.id, %actual, "completion beat the reaper; skipping");
                    report.skipped += 1;
                }
            }
        }

        if !report.expired.is_empty() {
            info!(scope = %scope, expired = report.expired.len(), skipped = report.skipped, "reap sweep done");
        }
        Ok(report)
    }
}
