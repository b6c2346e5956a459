use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use scribe_core::traits::TaskExecutor;
use scribe_core::types::{Context, NodeStatus};

/// Position of a node inside its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub usize);

/// Owned copy of a node's observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: String,
    pub goal: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_context: Option<Context>,
}

impl NodeSnapshot {
    /// Completion is by status alone. A missing output is caught when the
    /// dependent's context is merged.
    pub fn is_complete(&self) -> bool {
        self.status == NodeStatus::Complete
    }
}

/// Edge from a node to something it waits on.
#[derive(Debug, Clone)]
pub enum DependencyRef {
    /// Another node of the same graph.
    Local(NodeIndex),
    /// A node of another graph, resolved when the plan was built.
    External(Arc<NodeSnapshot>),
}

/// One unit of work in a plan graph.
///
/// Fields are private: status, output and error only change through
/// [`PlanGraph`](super::PlanGraph) so that `output_context` is present
/// exactly when the node is complete.
pub struct Node {
    pub(super) id: String,
    pub(super) goal: String,
    pub(super) status: NodeStatus,
    pub(super) executor: Arc<dyn TaskExecutor>,
    pub(super) input_context: Context,
    pub(super) output_context: Option<Context>,
    pub(super) error: Option<String>,
    pub(super) dependencies: Vec<DependencyRef>,
    pub(super) created: DateTime<Utc>,
    pub(super) updated: DateTime<Utc>,
}

impl Node {
    /// Create a node in `created` status.
    pub fn new(
        id: impl Into<String>,
        goal: impl Into<String>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            goal: goal.into(),
            status: NodeStatus::Created,
            executor,
            input_context: Context::new(),
            output_context: None,
            error: None,
            dependencies: vec![],
            created: now,
            updated: now,
        }
    }

    /// Set the input context.
    pub fn with_context(mut self, context: Context) -> Self {
        self.input_context = context;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn executor(&self) -> &Arc<dyn TaskExecutor> {
        &self.executor
    }

    pub fn executor_name(&self) -> &str {
        self.executor.name()
    }

    pub fn input_context(&self) -> &Context {
        &self.input_context
    }

    /// Present exactly when the node is complete.
    pub fn output_context(&self) -> Option<&Context> {
        self.output_context.as_ref()
    }

    /// Error message recorded when the node failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dependencies(&self) -> &[DependencyRef] {
        &self.dependencies
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id.clone(),
            goal: self.goal.clone(),
            status: self.status,
            output_context: self.output_context.clone(),
        }
    }

    pub(super) fn touch(&mut self) {
        self.updated = Utc::now();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("goal", &self.goal)
            .field("status", &self.status)
            .field("executor", &self.executor.name())
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}
