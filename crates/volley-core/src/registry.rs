//! # Operation registry
//!
//! Name-keyed factory lookup. A worker pool is configured with an operation
//! name plus an opaque config map and resolves the concrete implementation
//! here, so the orchestrator never depends on concrete operation types.
//!
//! Registration is expected once per operation kind at process start; the
//! first registration of a name wins and later ones are rejected.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::builtin::SleepOperation;
use crate::error::{OperationError, Result, VolleyError};
use crate::operation::{Operation, OperationConfig, OperationFactory};

/// Registry of operation factories
#[derive(Default)]
pub struct Registry {
    factories: RwLock<HashMap<String, OperationFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in operations already registered
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        // A fresh registry cannot already contain the name.
        let _ = registry.register(SleepOperation::NAME, SleepOperation::factory);
        registry
    }

    /// Register a factory under `name`
    pub fn register<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&OperationConfig) -> std::result::Result<Box<dyn Operation>, OperationError>
            + Send
            + Sync
            + 'static,
    {
        let mut factories = self.factories.write();
        if factories.contains_key(name) {
            return Err(VolleyError::DuplicateOperation(name.to_string()));
        }
        factories.insert(name.to_string(), Arc::new(factory));
        debug!("Registered operation {}", name);
        Ok(())
    }

    /// Look up the factory for `name`
    ///
    /// Returns `None` when nothing is registered; callers decide whether that
    /// is fatal.
    pub fn get(&self, name: &str) -> Option<OperationFactory> {
        self.factories.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("operations", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OpResult;
    use async_trait::async_trait;

    struct Fixed(i32);

    #[async_trait]
    impl Operation for Fixed {
        async fn init(&mut self) -> std::result::Result<(), OperationError> {
            Ok(())
        }

        async fn call(&mut self, _: usize, _: usize, _: usize) -> OpResult {
            OpResult::success(self.0, std::time::Duration::ZERO, 0)
        }
    }

    #[tokio::test]
    async fn test_first_registration_wins() {
        let registry = Registry::new();
        registry
            .register("fixed", |_| Ok(Box::new(Fixed(200)) as Box<dyn Operation>))
            .unwrap();

        let err = registry
            .register("fixed", |_| Ok(Box::new(Fixed(500)) as Box<dyn Operation>))
            .unwrap_err();
        assert!(matches!(err, VolleyError::DuplicateOperation(name) if name == "fixed"));

        let factory = registry.get("fixed").unwrap();
        let mut op = factory(&OperationConfig::new()).unwrap();
        assert_eq!(op.call(0, 0, 1).await.status_code, 200);
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let registry = Registry::new();
        assert!(registry.get("http").is_none());
        assert!(!registry.contains("http"));
    }

    #[test]
    fn test_builtins() {
        let registry = Registry::with_builtins();
        assert!(registry.contains("sleep"));
        assert_eq!(registry.names(), vec!["sleep".to_string()]);
    }
}
