use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use scribe_core::error::{Result, ScribeError};
use scribe_core::event::EventBus;
use scribe_core::traits::TaskExecutor;
use scribe_core::types::{Context, ExecutionScope, NodeStatus, PlanId, PlanStatus};

use crate::executor::PlanningExecutor;
use crate::graph::PlanGraph;

/// Outcome of one node in a finished run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    pub id: String,
    pub executor: String,
    pub goal: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_context: Option<Context>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a whole run, in node insertion order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub plan_id: PlanId,
    pub title: String,
    pub goal: String,
    pub status: PlanStatus,
    pub nodes: Vec<NodeReport>,
}

impl RunReport {
    pub fn from_graph(graph: &PlanGraph) -> Self {
        Self {
            plan_id: graph.id().clone(),
            title: graph.title().to_string(),
            goal: graph.goal().to_string(),
            status: graph.status(),
            nodes: graph
                .nodes()
                .iter()
                .map(|n| NodeReport {
                    id: n.id().to_string(),
                    executor: n.executor_name().to_string(),
                    goal: n.goal().to_string(),
                    status: n.status(),
                    output_context: n.output_context().cloned(),
                    error: n.error().map(str::to_string),
                })
                .collect(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A scheduled run: the report of every node plus the error that ended the
/// run, if any (deadlock, fail-fast, cancellation).
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub error: Option<ScribeError>,
}

impl RunOutcome {
    pub fn into_result(self) -> Result<RunReport> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.report),
        }
    }
}

/// Entry point for top-level runs.
///
/// Holds the planning executors that may act as the root of a run, the event
/// bus every run publishes to, and the token that cancels them.
pub struct PlanRunner {
    planners: HashMap<String, Arc<PlanningExecutor>>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl PlanRunner {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            planners: HashMap::new(),
            events,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Register a planning executor as a possible root, keyed by its id.
    pub fn register_planner(&mut self, planner: Arc<PlanningExecutor>) {
        self.planners.insert(planner.id().to_string(), planner);
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn root(&self, root_id: &str) -> Result<&Arc<PlanningExecutor>> {
        self.planners.get(root_id).ok_or_else(|| {
            ScribeError::Reference(format!("root executor '{}' not registered", root_id))
        })
    }

    /// Plan without running. Construction errors surface here.
    pub async fn plan(&self, root_id: &str, command: &str, context: &Context) -> Result<PlanGraph> {
        self.root(root_id)?.plan(command, context).await
    }

    /// Schedule a graph produced by [`PlanRunner::plan`]. The graph keeps
    /// every node's status, output and error afterwards, even on error.
    pub async fn run_graph(&self, root_id: &str, graph: &mut PlanGraph) -> Result<()> {
        let root = self.root(root_id)?;
        let scope = ExecutionScope::new(graph.id().clone(), self.events.clone(), self.cancel.clone());
        root.run_graph(graph, &scope).await
    }

    /// Plan, run, and report.
    ///
    /// Isolated node failures are part of the report. Deadlock, fail-fast and
    /// cancellation are returned as errors.
    pub async fn run_plan(&self, root_id: &str, command: &str, context: &Context) -> Result<RunReport> {
        self.run_outcome(root_id, command, context)
            .await?
            .into_result()
    }

    /// Like [`PlanRunner::run_plan`], but keeps the report when scheduling
    /// ends in an error. Only construction errors are returned as `Err`.
    pub async fn run_outcome(
        &self,
        root_id: &str,
        command: &str,
        context: &Context,
    ) -> Result<RunOutcome> {
        let mut graph = self.plan(root_id, command, context).await?;
        let error = self.run_graph(root_id, &mut graph).await.err();
        let report = RunReport::from_graph(&graph);
        info!(
            plan_id = %report.plan_id,
            status = %report.status,
            nodes = report.nodes.len(),
            error = error.as_ref().map(tracing::field::display),
            "Run finished"
        );
        Ok(RunOutcome { report, error })
    }
}
