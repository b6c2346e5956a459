use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::EventBus;

/// Key/value context passed into executors and stored as node output.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Unique plan identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlanId(pub String);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

}

impl From<&str> for PlanId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a single plan node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeStatus {
    #[default]
    Created,
    Ready,
    InProgress,
    Complete,
    Failed,
}

/// Lifecycle of a whole plan. Same progression as a node.
pub type PlanStatus = NodeStatus;

impl NodeStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Ready => 1,
            Self::InProgress => 2,
            Self::Complete | Self::Failed => 3,
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Status only moves forward; terminal statuses are final.
    pub fn can_advance_to(self, next: NodeStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Ready => "ready",
            Self::InProgress => "inProgress",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured plan document exchanged with the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDocument {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_goal")]
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PlanStatus>,
    #[serde(alias = "chapters")]
    pub nodes: Vec<NodeDocument>,
}

/// One node entry of a [`PlanDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    pub id: String,
    #[serde(alias = "targetAgent")]
    pub executor_name: String,
    #[serde(default = "default_goal")]
    pub goal: String,
    #[serde(
        default,
        deserialize_with = "deserialize_context",
        skip_serializing_if = "serde_json::Map::is_empty"
    )]
    pub context: Context,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
}

impl NodeDocument {
    pub fn new(
        id: impl Into<String>,
        executor_name: impl Into<String>,
        goal: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            executor_name: executor_name.into(),
            goal: goal.into(),
            context: Context::new(),
            dependencies: vec![],
            status: None,
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

pub fn default_title() -> String {
    "Untitled Plan".to_string()
}

pub fn default_goal() -> String {
    "No goal specified".to_string()
}

/// Normalize a raw context value: objects pass through, strings become `{"text": s}`.
pub fn context_from_value(value: serde_json::Value) -> Option<Context> {
    match value {
        serde_json::Value::Object(map) => Some(map),
        serde_json::Value::String(text) => {
            let mut map = Context::new();
            if !text.trim().is_empty() {
                map.insert("text".into(), serde_json::Value::String(text));
            }
            Some(map)
        }
        serde_json::Value::Null => Some(Context::new()),
        _ => None,
    }
}

fn deserialize_context<'de, D>(deserializer: D) -> std::result::Result<Context, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    context_from_value(value)
        .ok_or_else(|| serde::de::Error::custom("context must be an object or a string"))
}

/// Capability description handed to responders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    pub max_execution_time_ms: u64,
}

/// What a responder hands back to a single-shot executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Raw text, decoded by the result parser.
    Text(String),
    /// Request to run one of the executor's capabilities.
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
}

/// Request sent to a responder.
#[derive(Debug, Clone)]
pub struct ResponderRequest {
    pub executor: String,
    pub goal: String,
    pub context: Context,
    pub capabilities: Vec<CapabilityDefinition>,
}

/// Per-dispatch scope handed to executors and capability invocations.
#[derive(Clone)]
pub struct ExecutionScope {
    pub plan_id: PlanId,
    pub node_id: String,
    /// Nesting level; 0 for the top-level plan.
    pub depth: usize,
    pub cancel: CancellationToken,
    pub events: Arc<EventBus>,
}

impl ExecutionScope {
    pub fn new(plan_id: PlanId, events: Arc<EventBus>, cancel: CancellationToken) -> Self {
        Self {
            plan_id,
            node_id: String::new(),
            depth: 0,
            cancel,
            events,
        }
    }

    /// Scope for a node of the same plan.
    pub fn for_node(&self, node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..self.clone()
        }
    }

    /// Scope for a plan nested one level below this one.
    pub fn nested(&self, plan_id: PlanId) -> Self {
        Self {
            plan_id,
            node_id: String::new(),
            depth: self.depth + 1,
            cancel: self.cancel.child_token(),
            events: self.events.clone(),
        }
    }
}

impl std::fmt::Debug for ExecutionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionScope")
            .field("plan_id", &self.plan_id)
            .field("node_id", &self.node_id)
            .field("depth", &self.depth)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Run event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Scheduling of a plan started.
    PlanStarted {
        plan_id: PlanId,
        title: String,
        node_count: usize,
    },
    /// Node entered the ready set.
    NodeQueued { plan_id: PlanId, node_id: String },
    /// Node dispatched to its executor.
    NodeStarted {
        plan_id: PlanId,
        node_id: String,
        executor: String,
    },
    /// Node finished with an output.
    NodeCompleted {
        plan_id: PlanId,
        node_id: String,
        elapsed_ms: u64,
    },
    /// Node failed; dependents will never become ready.
    NodeFailed {
        plan_id: PlanId,
        node_id: String,
        error: String,
    },
    /// Capability invocation finished.
    CapabilityInvoked {
        plan_id: PlanId,
        node_id: String,
        capability: String,
        elapsed_ms: u64,
        ok: bool,
    },
    /// Non-terminal nodes remain with nothing left to dispatch.
    PlanDeadlocked { plan_id: PlanId, stuck: Vec<String> },
    /// Scheduling of a plan ended.
    PlanFinished {
        plan_id: PlanId,
        status: PlanStatus,
        completed: usize,
        failed: usize,
    },
}

impl RunEvent {
    pub fn plan_id(&self) -> &PlanId {
        match self {
            Self::PlanStarted { plan_id, .. }
            | Self::NodeQueued { plan_id, .. }
            | Self::NodeStarted { plan_id, .. }
            | Self::NodeCompleted { plan_id, .. }
            | Self::NodeFailed { plan_id, .. }
            | Self::CapabilityInvoked { plan_id, .. }
            | Self::PlanDeadlocked { plan_id, .. }
            | Self::PlanFinished { plan_id, .. } => plan_id,
        }
    }

    /// Short snake_case name, used by the JSONL run logger.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlanStarted { .. } => "plan_started",
            Self::NodeQueued { .. } => "node_queued",
            Self::NodeStarted { .. } => "node_started",
            Self::NodeCompleted { .. } => "node_completed",
            Self::NodeFailed { .. } => "node_failed",
            Self::CapabilityInvoked { .. } => "capability_invoked",
            Self::PlanDeadlocked { .. } => "plan_deadlocked",
            Self::PlanFinished { .. } => "plan_finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_id_from_str_and_serializes_as_string() {
        let id = PlanId::from("plan-7");
        assert_eq!(id.0, "plan-7");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("plan-7"));
        assert_ne!(PlanId::new(), PlanId::new());
    }

    #[test]
    fn status_only_advances() {
        assert!(NodeStatus::Created.can_advance_to(NodeStatus::Ready));
        assert!(NodeStatus::Created.can_advance_to(NodeStatus::InProgress));
        assert!(NodeStatus::InProgress.can_advance_to(NodeStatus::Failed));
        assert!(!NodeStatus::InProgress.can_advance_to(NodeStatus::Created));
        assert!(!NodeStatus::Complete.can_advance_to(NodeStatus::Failed));
        assert!(!NodeStatus::Failed.can_advance_to(NodeStatus::Complete));
    }

    #[test]
    fn status_serializes_camel_case() {
        let json = serde_json::to_string(&NodeStatus::InProgress).unwrap();
        assert_eq!(json, "\"inProgress\"");
    }

    #[test]
    fn document_accepts_original_aliases() {
        let raw = r#"{
            "title": "T",
            "goal": "G",
            "chapters": [
                {"id": "c1", "targetAgent": "Adder", "goal": "sum", "context": "add 1 and 2"},
                {"id": "c2", "executorName": "Adder", "goal": "double", "dependencies": ["c1"]}
            ]
        }"#;
        let doc: PlanDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.nodes[0].executor_name, "Adder");
        assert_eq!(
            doc.nodes[0].context.get("text"),
            Some(&serde_json::json!("add 1 and 2"))
        );
        assert_eq!(doc.nodes[1].dependencies, vec!["c1"]);
    }

    #[test]
    fn document_defaults_title_and_goal() {
        let doc: PlanDocument = serde_json::from_str(r#"{"nodes": []}"#).unwrap();
        assert_eq!(doc.title, "Untitled Plan");
        assert_eq!(doc.goal, "No goal specified");
    }

    #[test]
    fn document_rejects_numeric_context() {
        let raw = r#"{"nodes": [{"id": "c1", "executorName": "A", "context": 5}]}"#;
        assert!(serde_json::from_str::<PlanDocument>(raw).is_err());
    }

    #[test]
    fn nested_scope_increments_depth_and_links_cancel() {
        let parent = ExecutionScope::new(
            PlanId::new(),
            Arc::new(EventBus::default()),
            CancellationToken::new(),
        );
        let child = parent.nested(PlanId::from("inner"));
        assert_eq!(child.depth, 1);
        parent.cancel.cancel();
        assert!(child.cancel.is_cancelled());
    }
}
