//! Plan synthesis: structured document in, validated plan graph out.
//!
//! Construction runs in two passes so dependencies may point forward in
//! document order or at nodes of another plan:
//! 1. create every node, resolving its executor by name;
//! 2. wire dependencies, looking ids up locally first and then externally.
//!
//! A final cycle check rejects graphs that could never finish.

use std::sync::Arc;

use tracing::debug;

use scribe_core::error::{Result, ScribeError};
use scribe_core::traits::TaskExecutor;
use scribe_core::types::{NodeDocument, PlanDocument};

use crate::graph::{DependencyRef, Node, NodeSnapshot, PlanGraph};

/// Resolves an executor name from a plan document.
pub trait ExecutorLookup: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn TaskExecutor>>;
}

/// Resolves a node id that is not part of the plan being built.
pub trait NodeLookup: Send + Sync {
    fn resolve(&self, id: &str) -> Option<Arc<NodeSnapshot>>;
}

impl<F> ExecutorLookup for F
where
    F: Fn(&str) -> Option<Arc<dyn TaskExecutor>> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<Arc<dyn TaskExecutor>> {
        self(name)
    }
}

/// Build a plan graph from a document.
///
/// Node status in the document is ignored; every node starts `created`.
pub fn synthesize(
    doc: &PlanDocument,
    executors: &dyn ExecutorLookup,
    external: Option<&dyn NodeLookup>,
) -> Result<PlanGraph> {
    let mut graph = PlanGraph::new(doc.title.clone(), doc.goal.clone());

    // Pass 1: nodes
    for entry in &doc.nodes {
        let executor = executors.resolve(&entry.executor_name).ok_or_else(|| {
            ScribeError::Reference(format!(
                "executor '{}' for node '{}' not found",
                entry.executor_name, entry.id
            ))
        })?;
        let node = Node::new(entry.id.clone(), entry.goal.clone(), executor)
            .with_context(entry.context.clone());
        graph.add_node(node)?;
    }

    // Pass 2: dependencies
    for entry in &doc.nodes {
        let owner = graph.index_of(&entry.id).ok_or_else(|| {
            ScribeError::Structural(format!("node '{}' vanished during synthesis", entry.id))
        })?;
        for dep_id in &entry.dependencies {
            let dep = if let Some(local) = graph.index_of(dep_id) {
                DependencyRef::Local(local)
            } else if let Some(snapshot) = external.and_then(|lookup| lookup.resolve(dep_id)) {
                debug!(node_id = %entry.id, dependency = %dep_id, "Resolved external dependency");
                DependencyRef::External(snapshot)
            } else {
                return Err(ScribeError::Reference(format!(
                    "dependency '{}' of node '{}' not found",
                    dep_id, entry.id
                )));
            };
            graph.add_dependency(owner, dep)?;
        }
    }

    if let Some(cycle) = graph.find_cycle() {
        return Err(ScribeError::Structural(format!(
            "dependency cycle: {}",
            cycle.join(" -> ")
        )));
    }

    debug!(plan_id = %graph.id(), nodes = graph.len(), "Plan synthesized");
    Ok(graph)
}

/// Inverse mapping: graph back to a document, including node status.
pub fn to_document(graph: &PlanGraph) -> PlanDocument {
    let nodes = graph
        .indices()
        .filter_map(|idx| {
            let node = graph.node(idx)?;
            Some(NodeDocument {
                id: node.id().to_string(),
                executor_name: node.executor_name().to_string(),
                goal: node.goal().to_string(),
                context: node.input_context().clone(),
                dependencies: graph.dependency_ids(idx),
                status: Some(node.status()),
            })
        })
        .collect();

    PlanDocument {
        title: graph.title().to_string(),
        goal: graph.goal().to_string(),
        status: Some(graph.status()),
        nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorRegistry;
    use scribe_core::types::{Context, NodeStatus};
    use scribe_test_utils::{chain_plan_json, RecordingExecutor, ADDER_PLAN_JSON};
    use std::collections::BTreeSet;

    fn registry() -> ExecutorRegistry {
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(RecordingExecutor::new("Adder")));
        registry.register(Arc::new(RecordingExecutor::new("Worker")));
        registry
    }

    fn doc(raw: &str) -> PlanDocument {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_builds_adder_plan() {
        let graph = synthesize(&doc(ADDER_PLAN_JSON), &registry(), None).unwrap();
        assert_eq!(graph.title(), "T");
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get("c2").unwrap().executor_name(), "Adder");
        assert_eq!(graph.dependency_ids(graph.index_of("c2").unwrap()), vec!["c1"]);
    }

    #[test]
    fn test_forward_references_resolve() {
        let raw = r#"{"title":"T","goal":"G","nodes":[
            {"id":"c1","executorName":"Worker","goal":"late","dependencies":["c2"]},
            {"id":"c2","executorName":"Worker","goal":"early"}
        ]}"#;
        let graph = synthesize(&doc(raw), &registry(), None).unwrap();
        assert_eq!(graph.dependency_ids(graph.index_of("c1").unwrap()), vec!["c2"]);
    }

    #[test]
    fn test_unknown_executor_is_reference_error() {
        let raw = r#"{"nodes":[{"id":"c1","executorName":"Ghost","goal":"boo"}]}"#;
        let err = synthesize(&doc(raw), &registry(), None).unwrap_err();
        assert!(matches!(err, ScribeError::Reference(_)));
    }

    #[test]
    fn test_unknown_dependency_is_reference_error() {
        let raw = r#"{"nodes":[{"id":"c1","executorName":"Worker","dependencies":["c9"]}]}"#;
        let err = synthesize(&doc(raw), &registry(), None).unwrap_err();
        assert!(err.to_string().contains("c9"));
        assert!(matches!(err, ScribeError::Reference(_)));
    }

    #[test]
    fn test_duplicate_ids_are_structural() {
        let raw = r#"{"nodes":[
            {"id":"c1","executorName":"Worker"},
            {"id":"c1","executorName":"Adder"}
        ]}"#;
        let err = synthesize(&doc(raw), &registry(), None).unwrap_err();
        assert!(matches!(err, ScribeError::Structural(_)));
    }

    #[test]
    fn test_cycle_is_structural() {
        let raw = r#"{"nodes":[
            {"id":"c1","executorName":"Worker","dependencies":["c2"]},
            {"id":"c2","executorName":"Worker","dependencies":["c1"]}
        ]}"#;
        let err = synthesize(&doc(raw), &registry(), None).unwrap_err();
        assert!(matches!(err, ScribeError::Structural(ref m) if m.contains("cycle")));
    }

    #[test]
    fn test_external_lookup_is_consulted() {
        let earlier = synthesize(&doc(ADDER_PLAN_JSON), &registry(), None).unwrap();
        let raw = r#"{"nodes":[{"id":"c3","executorName":"Worker","dependencies":["c1"]}]}"#;

        let missing = synthesize(&doc(raw), &registry(), None).unwrap_err();
        assert!(matches!(missing, ScribeError::Reference(_)));

        let graph = synthesize(&doc(raw), &registry(), Some(&earlier as &dyn NodeLookup)).unwrap();
        let c3 = graph.index_of("c3").unwrap();
        assert!(matches!(
            graph.node(c3).unwrap().dependencies()[0],
            DependencyRef::External(_)
        ));
        assert!(!graph.dependencies_complete(c3));
    }

    #[test]
    fn test_closure_lookup() {
        let worker: Arc<dyn TaskExecutor> = Arc::new(RecordingExecutor::new("Worker"));
        let lookup = move |name: &str| (name == "Worker").then(|| worker.clone());
        let raw = r#"{"nodes":[{"id":"c1","executorName":"Worker"}]}"#;
        assert!(synthesize(&doc(raw), &lookup, None).is_ok());
    }

    #[test]
    fn test_document_status_is_ignored() {
        let raw = r#"{"nodes":[{"id":"c1","executorName":"Worker","status":"complete"}]}"#;
        let graph = synthesize(&doc(raw), &registry(), None).unwrap();
        assert_eq!(graph.nodes()[0].status(), NodeStatus::Created);
        assert!(graph.nodes()[0].output_context().is_none());
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let original = doc(&chain_plan_json("Worker"));
        let graph = synthesize(&original, &registry(), None).unwrap();
        let back = to_document(&graph);

        assert_eq!(back.title, original.title);
        assert_eq!(back.nodes.len(), original.nodes.len());
        for (a, b) in original.nodes.iter().zip(&back.nodes) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.executor_name, b.executor_name);
            assert_eq!(a.goal, b.goal);
            let deps_a: BTreeSet<_> = a.dependencies.iter().collect();
            let deps_b: BTreeSet<_> = b.dependencies.iter().collect();
            assert_eq!(deps_a, deps_b);
            assert_eq!(b.status, Some(NodeStatus::Created));
        }
    }

    #[test]
    fn test_round_trip_keeps_context() {
        let raw = r#"{"nodes":[{"id":"c1","executorName":"Worker","context":"add 1 and 2"}]}"#;
        let graph = synthesize(&doc(raw), &registry(), None).unwrap();
        let back = to_document(&graph);
        let mut expected = Context::new();
        expected.insert("text".into(), serde_json::json!("add 1 and 2"));
        assert_eq!(back.nodes[0].context, expected);
    }
}
