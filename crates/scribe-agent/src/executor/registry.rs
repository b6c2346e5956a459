use std::collections::HashMap;
use std::sync::Arc;

use scribe_core::traits::TaskExecutor;

use crate::synthesis::ExecutorLookup;

/// Registry shared between the runner and planning executors.
pub type SharedExecutorRegistry = Arc<tokio::sync::RwLock<ExecutorRegistry>>;

/// Executors keyed by the name plan documents refer to.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Register an executor under its name. A later registration wins.
    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(executor.name().to_string(), executor);
    }

    /// Unregister an executor by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.executors.remove(name).is_some()
    }

    /// Get an executor by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn into_shared(self) -> SharedExecutorRegistry {
        Arc::new(tokio::sync::RwLock::new(self))
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorLookup for ExecutorRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.get(name)
    }
}
