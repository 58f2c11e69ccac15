//! Tenant tiers and admission decisions.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Tenant tier, resolved per scope by the admission policy source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Free plan
    Free,
    /// Team plan
    Team,
    /// Enterprise plan
    Enterprise,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Team => write!(f, "team"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Concurrency limit attached to a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcurrencyLimit {
    /// Restrictions disabled; admit immediately without counting.
    Unlimited,
    /// At most this many concurrently active tasks per scope+pipeline pair.
    Max(NonZeroU32),
}

impl ConcurrencyLimit {
    /// Build a bounded limit. A zero max collapses to a limit of one.
    pub fn max(n: u32) -> Self {
        Self::Max(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
    }

    /// Whether `active` running tasks leave room for one more.
    pub fn admits(self, active: usize) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Max(max) => active < max.get() as usize,
        }
    }
}

/// Ephemeral admission decision.
///
/// Recomputed from the store per request, never persisted, never cached:
/// a tier change is observed on the next admission call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionTicket {
    /// Whether the new work must wait for a slot instead of starting now.
    pub should_queue: bool,
    /// The limit the decision was made against.
    pub limit: ConcurrencyLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_always_admits() {
        assert!(ConcurrencyLimit::Unlimited.admits(0));
        assert!(ConcurrencyLimit::Unlimited.admits(10_000));
    }

    #[test]
    fn bounded_limit_admits_below_max_only() {
        let limit = ConcurrencyLimit::max(3);
        assert!(limit.admits(0));
        assert!(limit.admits(2));
        assert!(!limit.admits(3));
        assert!(!limit.admits(4));
    }

    #[test]
    fn zero_max_collapses_to_one() {
        let limit = ConcurrencyLimit::max(0);
        assert!(limit.admits(0));
        assert!(!limit.admits(1));
    }
}
