//! Task admission control.
//!
//! Decides whether new work may start immediately or must queue, from the
//! owning scope's tier and the store-derived count of active tasks. The
//! controller holds no state of its own: every call recomputes, so a tier
//! change is observed on the very next admission request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{AdmissionTicket, ConcurrencyLimit, PipelineId, ScopeId, Tier};
use relay_storage::TaskStore;
use tracing::debug;

use crate::error::EngineError;

/// Errors from the tier/admission policy source.
///
/// These propagate to the caller as admission failures, never as silent
/// defaults.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The scope does not resolve to a known tier.
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    /// Other policy source failure.
    #[error("{0}")]
    Other(String),
}

/// Source of tier assignments and per-tier concurrency limits.
#[async_trait]
pub trait TierPolicy: Send + Sync {
    /// Resolve the tier for a scope. Unresolvable scopes are an error.
    async fn tier(&self, scope: &ScopeId) -> Result<Tier, PolicyError>;

    /// Concurrency limit configured for a tier.
    fn concurrency_limit(&self, tier: Tier) -> ConcurrencyLimit;
}

/// In-memory tier policy with fixed assignments.
pub struct StaticTierPolicy {
    tiers: HashMap<ScopeId, Tier>,
    limits: HashMap<Tier, ConcurrencyLimit>,
}

impl StaticTierPolicy {
    /// Create a policy with the default limits: Free 1, Team 5,
    /// Enterprise unrestricted.
    pub fn new() -> Self {
        let mut limits = HashMap::new();
        limits.insert(Tier::Free, ConcurrencyLimit::max(1));
        limits.insert(Tier::Team, ConcurrencyLimit::max(5));
        limits.insert(Tier::Enterprise, ConcurrencyLimit::Unlimited);
        Self {
            tiers: HashMap::new(),
            limits,
        }
    }

    /// Assign a scope to a tier.
    pub fn with_scope(mut self, scope: ScopeId, tier: Tier) -> Self {
        self.tiers.insert(scope, tier);
        self
    }

    /// Override the limit for a tier.
    pub fn with_limit(mut self, tier: Tier, limit: ConcurrencyLimit) -> Self {
        self.limits.insert(tier, limit);
        self
    }
}

impl Default for StaticTierPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TierPolicy for StaticTierPolicy {
    async fn tier(&self, scope: &ScopeId) -> Result<Tier, PolicyError> {
        self.tiers
            .get(scope)
            .copied()
            .ok_or_else(|| PolicyError::UnknownScope(scope.to_string()))
    }

    fn concurrency_limit(&self, tier: Tier) -> ConcurrencyLimit {
        self.limits
            .get(&tier)
            .copied()
            .unwrap_or(ConcurrencyLimit::Unlimited)
    }
}

/// Decides admission for new units of work.
#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<dyn TaskStore>,
    policy: Arc<dyn TierPolicy>,
}

impl AdmissionController {
    /// Create a controller.
    pub fn new(store: Arc<dyn TaskStore>, policy: Arc<dyn TierPolicy>) -> Self {
        Self { store, policy }
    }

    /// Decide whether work for the scope+pipeline pair may start now.
    ///
    /// Pure decision: no task is created or mutated here; the caller acts
    /// on the ticket.
    pub async fn admit(
        &self,
        scope: &ScopeId,
        pipeline: &PipelineId,
    ) -> Result<AdmissionTicket, EngineError> {
        let tier = self.policy.tier(scope).await?;
        let limit = self.policy.concurrency_limit(tier);

        if limit == ConcurrencyLimit::Unlimited {
            debug!(%scope, %tier, "admission unrestricted");
            return Ok(AdmissionTicket {
                should_queue: false,
                limit,
            });
        }

        let active = self.store.count_active(scope, pipeline).await?;
        let should_queue = !limit.admits(active);
        debug!(%scope, %pipeline, %tier, active, should_queue, "admission decided");
        Ok(AdmissionTicket {
            should_queue,
            limit,
        })
    }
}
