use serde_json::json;

use scribe_core::error::{Result, ScribeError};
use scribe_core::types::Context;

use super::node::NodeIndex;
use super::plan::PlanGraph;

/// Context handed to a node's executor.
///
/// Starts from the node's input context and adds, per dependency, an entry
/// keyed by the dependency id: `{"goal": ..., "result": <output context>}`.
/// A dependency entry overrides an input key with the same name.
pub fn merged_context(graph: &PlanGraph, idx: NodeIndex) -> Result<Context> {
    let node = graph.node(idx).ok_or_else(|| {
        ScribeError::Structural(format!("node index {} is not part of this plan", idx.0))
    })?;

    let mut merged = node.input_context().clone();
    for dep in node.dependencies() {
        let dep_id = graph.dependency_id(dep);
        let (goal, output) =
            graph
                .dependency_output(dep)
                .ok_or_else(|| ScribeError::Dependency {
                    node: node.id().to_string(),
                    dependency: dep_id.to_string(),
                })?;
        merged.insert(
            dep_id.to_string(),
            json!({ "goal": goal, "result": output }),
        );
    }
    Ok(merged)
}
