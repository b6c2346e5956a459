use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scribe_core::error::{Result, ScribeError};
use scribe_core::traits::{Capability, DEFAULT_MAX_EXECUTION_TIME};
use scribe_core::types::{CapabilityDefinition, ExecutionScope};

use crate::invoke::invoke_with_limit;

/// Registry of capabilities owned by one executor.
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    default_timeout: Duration,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
            default_timeout: DEFAULT_MAX_EXECUTION_TIME,
        }
    }

    /// Budget for capabilities that do not declare their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a capability. A later registration under the same name wins.
    pub fn register(&mut self, capability: impl Capability) {
        self.register_arc(Arc::new(capability));
    }

    /// Register a capability shared with other registries.
    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        self.capabilities.insert(name, capability);
    }

    /// Unregister a capability by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.capabilities.remove(name).is_some()
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.capabilities.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Capability definitions for responders, sorted by name.
    pub fn definitions(&self) -> Vec<CapabilityDefinition> {
        let mut defs: Vec<CapabilityDefinition> = self
            .capabilities
            .values()
            .map(|c| {
                let mut def = c.definition();
                def.max_execution_time_ms = self.limit_for(c.as_ref()).as_millis() as u64;
                def
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Invoke a capability by name through the invocation contract.
    pub async fn invoke(
        &self,
        name: &str,
        input: serde_json::Value,
        scope: &ExecutionScope,
    ) -> Result<serde_json::Value> {
        let capability = self
            .get(name)
            .ok_or_else(|| ScribeError::Reference(format!("unknown capability '{}'", name)))?;
        let limit = self.limit_for(capability.as_ref());
        invoke_with_limit(capability.as_ref(), input, scope, limit).await
    }

    /// Create a registry with all built-in capabilities registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::builtin::sum::SumCapability);
        registry.register(crate::builtin::plan::ValidatePlanCapability);
        registry
    }

    fn limit_for(&self, capability: &dyn Capability) -> Duration {
        capability
            .max_execution_time()
            .unwrap_or(self.default_timeout)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
