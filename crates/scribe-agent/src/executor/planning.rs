use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info, warn};

use scribe_core::config::RuntimeConfig;
use scribe_core::error::{Result, ScribeError};
use scribe_core::traits::{Planner, TaskExecutor};
use scribe_core::types::{Context, ExecutionScope, NodeStatus};

use super::registry::SharedExecutorRegistry;
use crate::graph::PlanGraph;
use crate::parse::DocumentParser;
use crate::scheduler::Scheduler;
use crate::synthesis::synthesize;

/// Executor that answers its goal by planning and running a nested graph.
///
/// `plan` and `run_graph` are the two halves of a top-level run and are used
/// directly by [`crate::PlanRunner`]. As a node executor it runs both under
/// `depth + 1` and reports every nested node's output keyed by node id.
pub struct PlanningExecutor {
    id: String,
    name: String,
    description: String,
    planner: Arc<dyn Planner>,
    executors: SharedExecutorRegistry,
    runtime: RuntimeConfig,
}

impl PlanningExecutor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        planner: Arc<dyn Planner>,
        executors: SharedExecutorRegistry,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            planner,
            executors,
            runtime: RuntimeConfig::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Node ceiling, parallelism, failure policy and depth limit.
    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Ask the planner for a document and build a graph from it.
    ///
    /// Fails before anything runs: `Planner`, `Parse`, `Reference`,
    /// `Structural` or `PlanTooLarge`.
    pub async fn plan(&self, command: &str, context: &Context) -> Result<PlanGraph> {
        let raw = self
            .planner
            .generate_plan(command, context)
            .await
            .map_err(|e| match e {
                ScribeError::Planner(_) => e,
                other => ScribeError::Planner(other.to_string()),
            })?;

        let doc = DocumentParser::parse(&raw)?;
        if doc.nodes.len() > self.runtime.max_nodes {
            return Err(ScribeError::PlanTooLarge {
                count: doc.nodes.len(),
                limit: self.runtime.max_nodes,
            });
        }

        let graph = {
            let registry = self.executors.read().await;
            synthesize(&doc, &*registry, None)?
        };
        info!(
            executor = %self.name,
            plan_id = %graph.id(),
            title = %graph.title(),
            nodes = graph.len(),
            "Plan ready"
        );
        Ok(graph)
    }

    /// Schedule `graph` with this executor's runtime settings.
    pub async fn run_graph(&self, graph: &mut PlanGraph, scope: &ExecutionScope) -> Result<()> {
        Scheduler::from_config(&self.runtime).run(graph, scope).await
    }

    async fn run_nested(
        &self,
        goal: &str,
        context: &Context,
        scope: &ExecutionScope,
    ) -> Result<Context> {
        let depth = scope.depth + 1;
        if depth > self.runtime.max_depth {
            return Err(ScribeError::executor(
                &self.name,
                format!(
                    "nested plan depth {} exceeds limit {}",
                    depth, self.runtime.max_depth
                ),
            ));
        }

        let mut graph = self
            .plan(goal, context)
            .await
            .map_err(|e| ScribeError::executor(&self.name, e.to_string()))?;
        let nested = scope.nested(graph.id().clone());
        debug!(
            executor = %self.name,
            parent_plan = %scope.plan_id,
            node_id = %scope.node_id,
            plan_id = %graph.id(),
            depth,
            "Running nested plan"
        );

        match self.run_graph(&mut graph, &nested).await {
            Ok(()) => {}
            Err(ScribeError::Cancelled) => return Err(ScribeError::Cancelled),
            Err(e) => return Err(ScribeError::executor(&self.name, e.to_string())),
        }

        let failed: Vec<String> = graph
            .nodes()
            .iter()
            .filter(|n| n.status() == NodeStatus::Failed)
            .map(|n| format!("{} ({})", n.id(), n.error().unwrap_or("unknown error")))
            .collect();
        if !failed.is_empty() {
            warn!(executor = %self.name, plan_id = %graph.id(), failed = ?failed, "Nested plan failed");
            return Err(ScribeError::executor(
                &self.name,
                format!("nested plan '{}' failed at: {}", graph.title(), failed.join("; ")),
            ));
        }

        let mut result = Context::new();
        for node in graph.nodes() {
            if let Some(output) = node.output_context() {
                result.insert(node.id().to_string(), Value::Object(output.clone()));
            }
        }
        Ok(result)
    }
}

impl TaskExecutor for PlanningExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute<'a>(
        &'a self,
        goal: &'a str,
        context: &'a Context,
        scope: &'a ExecutionScope,
    ) -> BoxFuture<'a, Result<Context>> {
        Box::pin(self.run_nested(goal, context, scope))
    }
}
