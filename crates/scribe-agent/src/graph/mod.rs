//! Plan graph model: an arena DAG of nodes with status, input and output
//! context, and dependency edges.
//!
//! `PlanGraph` owns its nodes in a `Vec`; dependencies point into that arena
//! by index, or at a snapshot of a node from another plan. All status and
//! output changes go through the graph so a node's output exists exactly
//! when it is complete.

pub mod context;
pub mod node;
pub mod plan;

pub use context::merged_context;
pub use node::{DependencyRef, Node, NodeIndex, NodeSnapshot};
pub use plan::PlanGraph;
