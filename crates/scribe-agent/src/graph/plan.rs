use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use scribe_core::error::{Result, ScribeError};
use scribe_core::types::{Context, NodeStatus, PlanId, PlanStatus};

use super::node::{DependencyRef, Node, NodeIndex, NodeSnapshot};

/// A plan: an arena of nodes with dependency edges.
///
/// Nodes live in insertion order; `index` maps ids to arena positions.
pub struct PlanGraph {
    id: PlanId,
    title: String,
    goal: String,
    status: PlanStatus,
    nodes: Vec<Node>,
    index: HashMap<String, NodeIndex>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl PlanGraph {
    pub fn new(title: impl Into<String>, goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PlanId::new(),
            title: title.into(),
            goal: goal.into(),
            status: PlanStatus::Created,
            nodes: Vec::new(),
            index: HashMap::new(),
            created: now,
            updated: now,
        }
    }

    pub fn id(&self) -> &PlanId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&Node> {
        self.nodes.get(idx.0)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.index_of(id).and_then(|idx| self.node(idx))
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Arena indices in insertion order.
    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> {
        (0..self.nodes.len()).map(NodeIndex)
    }

    /// Append a node. Fails if its id is already taken.
    pub fn add_node(&mut self, node: Node) -> Result<NodeIndex> {
        if self.index.contains_key(&node.id) {
            return Err(ScribeError::Structural(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        let idx = NodeIndex(self.nodes.len());
        self.index.insert(node.id.clone(), idx);
        self.nodes.push(node);
        self.touch();
        Ok(idx)
    }

    /// Make `node` wait on `dep`. Adding the same dependency twice is a no-op.
    pub fn add_dependency(&mut self, node: NodeIndex, dep: DependencyRef) -> Result<()> {
        let owner_id = self.checked(node)?.id.clone();

        if let DependencyRef::Local(target) = &dep {
            if self.node(*target).is_none() {
                return Err(ScribeError::Structural(format!(
                    "dependency index {} of '{}' is not part of this plan",
                    target.0, owner_id
                )));
            }
            if *target == node {
                return Err(ScribeError::Structural(format!(
                    "node '{}' cannot depend on itself",
                    owner_id
                )));
            }
        }

        let dep_id = self.dependency_id(&dep).to_string();
        let existing = &self.nodes[node.0].dependencies;
        if existing.iter().any(|d| self.dependency_id(d) == dep_id) {
            return Ok(());
        }

        let owner = &mut self.nodes[node.0];
        owner.dependencies.push(dep);
        owner.touch();
        self.touch();
        Ok(())
    }

    /// Id of the node a dependency points at.
    pub fn dependency_id<'a>(&'a self, dep: &'a DependencyRef) -> &'a str {
        match dep {
            DependencyRef::Local(idx) => self.nodes.get(idx.0).map_or("", |n| n.id.as_str()),
            DependencyRef::External(snapshot) => &snapshot.id,
        }
    }

    /// Ids of a node's dependencies, in declaration order.
    pub fn dependency_ids(&self, idx: NodeIndex) -> Vec<String> {
        self.node(idx)
            .map(|n| {
                n.dependencies
                    .iter()
                    .map(|d| self.dependency_id(d).to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Goal and output of a dependency, if it completed.
    pub fn dependency_output<'a>(&'a self, dep: &'a DependencyRef) -> Option<(&'a str, &'a Context)> {
        match dep {
            DependencyRef::Local(idx) => {
                let node = self.nodes.get(idx.0)?;
                node.output_context.as_ref().map(|out| (node.goal.as_str(), out))
            }
            DependencyRef::External(snapshot) => snapshot
                .output_context
                .as_ref()
                .map(|out| (snapshot.goal.as_str(), out)),
        }
    }

    pub fn is_dependency_complete(&self, dep: &DependencyRef) -> bool {
        match dep {
            DependencyRef::Local(idx) => self
                .nodes
                .get(idx.0)
                .is_some_and(|n| n.status == NodeStatus::Complete),
            DependencyRef::External(snapshot) => snapshot.is_complete(),
        }
    }

    /// Whether every dependency of `idx` is complete. True for no dependencies.
    pub fn dependencies_complete(&self, idx: NodeIndex) -> bool {
        self.node(idx).is_some_and(|n| {
            n.dependencies
                .iter()
                .all(|d| self.is_dependency_complete(d))
        })
    }

    /// Advance the plan status. Moving backwards is a structural error.
    pub fn set_status(&mut self, status: PlanStatus) -> Result<()> {
        if !self.status.can_advance_to(status) {
            return Err(ScribeError::Structural(format!(
                "plan status cannot move from {} to {}",
                self.status, status
            )));
        }
        self.status = status;
        self.touch();
        Ok(())
    }

    /// Mark a node as dispatched.
    pub fn start_node(&mut self, idx: NodeIndex) -> Result<()> {
        self.advance_node(idx, NodeStatus::InProgress)?;
        Ok(())
    }

    /// Record a node's output and mark it complete.
    pub fn complete_node(&mut self, idx: NodeIndex, output: Context) -> Result<()> {
        let node = self.advance_node(idx, NodeStatus::Complete)?;
        node.output_context = Some(output);
        node.error = None;
        Ok(())
    }

    /// Record a node's failure. The node stays in the graph.
    pub fn fail_node(&mut self, idx: NodeIndex, message: impl Into<String>) -> Result<()> {
        let node = self.advance_node(idx, NodeStatus::Failed)?;
        node.output_context = None;
        node.error = Some(message.into());
        Ok(())
    }

    /// Ids on a dependency cycle among local nodes, first node repeated at the end.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut path: Vec<usize> = Vec::new();

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            // Iterative DFS: (node, next dependency position to visit)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            marks[start] = Mark::OnStack;
            path.push(start);

            while let Some(top) = stack.last_mut() {
                let (current, pos) = *top;
                let deps = &self.nodes[current].dependencies;
                if pos >= deps.len() {
                    marks[current] = Mark::Done;
                    path.pop();
                    stack.pop();
                    continue;
                }
                top.1 += 1;
                let dep = &deps[pos];

                let DependencyRef::Local(target) = dep else {
                    continue;
                };
                match marks[target.0] {
                    Mark::Unvisited => {
                        marks[target.0] = Mark::OnStack;
                        path.push(target.0);
                        stack.push((target.0, 0));
                    }
                    Mark::OnStack => {
                        let from = path.iter().position(|&i| i == target.0).unwrap_or(0);
                        let mut cycle: Vec<String> = path[from..]
                            .iter()
                            .map(|&i| self.nodes[i].id.clone())
                            .collect();
                        cycle.push(self.nodes[target.0].id.clone());
                        return Some(cycle);
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }

    pub fn count_with_status(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }

    /// Ids of nodes that are neither complete nor failed, in insertion order.
    pub fn unfinished_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| !n.status.is_terminal())
            .map(|n| n.id.clone())
            .collect()
    }

    fn checked(&self, idx: NodeIndex) -> Result<&Node> {
        self.node(idx).ok_or_else(|| {
            ScribeError::Structural(format!("node index {} is not part of this plan", idx.0))
        })
    }

    fn advance_node(&mut self, idx: NodeIndex, next: NodeStatus) -> Result<&mut Node> {
        let current = self.checked(idx)?.status;
        if !current.can_advance_to(next) {
            return Err(ScribeError::Structural(format!(
                "node '{}' cannot move from {} to {}",
                self.nodes[idx.0].id, current, next
            )));
        }
        self.touch();
        let node = &mut self.nodes[idx.0];
        node.status = next;
        node.touch();
        Ok(node)
    }

    fn touch(&mut self) {
        self.updated = Utc::now();
    }
}

impl std::fmt::Debug for PlanGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanGraph")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("status", &self.status)
            .field("nodes", &self.nodes)
            .finish()
    }
}

impl crate::synthesis::NodeLookup for PlanGraph {
    fn resolve(&self, id: &str) -> Option<Arc<NodeSnapshot>> {
        self.get(id).map(|n| Arc::new(n.snapshot()))
    }
}
