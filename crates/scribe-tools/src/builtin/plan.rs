use std::collections::HashSet;

use futures::future::BoxFuture;

use scribe_core::error::{Result, ScribeError};
use scribe_core::traits::Capability;
use scribe_core::types::PlanDocument;

/// Checks a plan document and returns it normalised.
///
/// The normalised form uses `nodes`/`executorName`, fills in the default
/// title and goal, and turns string contexts into `{"text": ...}`.
pub struct ValidatePlanCapability;

fn node_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["id"],
        "properties": {
            "id": { "type": "string", "pattern": "^c[0-9]+$" },
            "executorName": { "type": "string", "minLength": 1 },
            "targetAgent": { "type": "string", "minLength": 1 },
            "goal": { "type": "string" },
            "context": { "type": ["object", "string", "null"] },
            "dependencies": {
                "type": "array",
                "items": { "type": "string", "pattern": "^c[0-9]+$" }
            }
        }
    })
}

impl Capability for ValidatePlanCapability {
    fn name(&self) -> &str {
        "validate_plan"
    }
    fn description(&self) -> &str {
        "Validate a plan document and return its normalised form."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "goal": { "type": "string" },
                "nodes": { "type": "array", "items": node_schema() },
                "chapters": { "type": "array", "items": node_schema() }
            }
        })
    }
    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["title", "goal", "nodes"],
            "properties": {
                "title": { "type": "string" },
                "goal": { "type": "string" },
                "nodes": { "type": "array" }
            }
        })
    }
    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let invalid = |reason: String| ScribeError::Validation {
                capability: "validate_plan".into(),
                stage: "input".into(),
                reason,
            };

            let doc: PlanDocument =
                serde_json::from_value(input).map_err(|e| invalid(e.to_string()))?;

            let mut seen = HashSet::new();
            for node in &doc.nodes {
                if !seen.insert(node.id.as_str()) {
                    return Err(invalid(format!("duplicate node id '{}'", node.id)));
                }
                if node.dependencies.iter().any(|d| d == &node.id) {
                    return Err(invalid(format!("node '{}' depends on itself", node.id)));
                }
            }

            let mut doc = doc;
            doc.status = None;
            for node in &mut doc.nodes {
                node.status = None;
            }
            Ok(serde_json::to_value(&doc)?)
        })
    }
}
