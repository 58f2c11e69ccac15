//! Backend registry.

use std::collections::HashMap;
use std::sync::Arc;

use relay_core::BackendKind;

use crate::executor::RemoteExecutor;

/// Registry of executor backends, keyed by backend tag.
///
/// Dispatch stays backend-agnostic: it looks the executor up by the task's
/// tag and talks to the trait.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    backends: HashMap<BackendKind, Arc<dyn RemoteExecutor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for a backend tag, replacing any previous one.
    pub fn register(&mut self, kind: BackendKind, executor: Arc<dyn RemoteExecutor>) {
        self.backends.insert(kind, executor);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: BackendKind, executor: Arc<dyn RemoteExecutor>) -> Self {
        self.register(kind, executor);
        self
    }

    /// Look up the executor for a backend tag.
    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn RemoteExecutor>> {
        self.backends.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackExecutor;

    #[test]
    fn lookup_by_tag() {
        let registry = ExecutorRegistry::new().with(
            BackendKind::Container,
            Arc::new(LoopbackExecutor::new(BackendKind::Container)),
        );
        assert!(registry.get(BackendKind::Container).is_some());
        assert!(registry.get(BackendKind::Vm).is_none());
    }
}
