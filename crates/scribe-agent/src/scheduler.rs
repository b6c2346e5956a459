use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use scribe_core::config::{FailurePolicy, RuntimeConfig};
use scribe_core::error::{Result, ScribeError};
use scribe_core::types::{ExecutionScope, NodeStatus, PlanStatus, RunEvent};

use crate::graph::{merged_context, NodeIndex, PlanGraph};

/// Drives a plan graph to completion.
///
/// The scheduler loop is the only writer of graph state. Dispatched nodes run
/// on cloned contexts inside a `FuturesUnordered` and hand their results back
/// to the loop, which records them and recomputes the ready set in insertion
/// order. With `max_parallel == 1` nodes run strictly one at a time in FIFO
/// order of readiness.
#[derive(Debug, Clone)]
pub struct Scheduler {
    max_parallel: usize,
    failure_policy: FailurePolicy,
}

struct Outcome {
    idx: NodeIndex,
    result: Result<scribe_core::types::Context>,
    elapsed_ms: u64,
}

impl Scheduler {
    pub fn new(max_parallel: usize, failure_policy: FailurePolicy) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            failure_policy,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.max_parallel, config.failure_policy)
    }

    /// Run every reachable node of `graph`.
    ///
    /// Node failures are recorded on the node. The run itself fails with
    /// `Deadlock` when unfinished nodes remain and nothing can be dispatched,
    /// with `NodeFailed` under fail-fast, and with `Cancelled` when the
    /// scope's token fires. A dependency without output aborts the run with
    /// `Dependency`; the plan is still finished as failed.
    pub async fn run(&self, graph: &mut PlanGraph, scope: &ExecutionScope) -> Result<()> {
        let plan_id = graph.id().clone();
        let scope = ExecutionScope {
            plan_id: plan_id.clone(),
            ..scope.clone()
        };

        graph.set_status(PlanStatus::InProgress)?;
        info!(plan_id = %plan_id, title = %graph.title(), nodes = graph.len(), "Plan started");
        scope.events.publish(RunEvent::PlanStarted {
            plan_id: plan_id.clone(),
            title: graph.title().to_string(),
            node_count: graph.len(),
        });

        let mut ready: VecDeque<NodeIndex> = VecDeque::new();
        let mut queued: HashSet<NodeIndex> = HashSet::new();
        self.enqueue_ready(graph, &scope, &mut ready, &mut queued);

        let mut in_flight = FuturesUnordered::new();
        let mut first_failure: Option<(String, String)> = None;
        let mut aborted: Option<ScribeError> = None;
        let mut cancelled = false;

        'run: loop {
            if scope.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            // Dispatch while there is capacity
            while first_failure.is_none() && in_flight.len() < self.max_parallel {
                let Some(idx) = ready.pop_front() else {
                    break;
                };
                queued.remove(&idx);

                let merged = match merged_context(graph, idx) {
                    Ok(merged) => merged,
                    Err(e) => {
                        aborted = Some(e);
                        break 'run;
                    }
                };
                if let Err(e) = graph.start_node(idx) {
                    aborted = Some(e);
                    break 'run;
                }

                let node = &graph.nodes()[idx.0];
                let executor = node.executor().clone();
                let goal = node.goal().to_string();
                let node_scope = scope.for_node(node.id());

                debug!(plan_id = %plan_id, node_id = %node.id(), executor = %executor.name(), "Dispatching node");
                scope.events.publish(RunEvent::NodeStarted {
                    plan_id: plan_id.clone(),
                    node_id: node.id().to_string(),
                    executor: executor.name().to_string(),
                });

                in_flight.push(async move {
                    let start = Instant::now();
                    let result = executor.execute(&goal, &merged, &node_scope).await;
                    Outcome {
                        idx,
                        result,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    }
                });
            }

            if in_flight.is_empty() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = scope.cancel.cancelled() => None,
                outcome = in_flight.next() => outcome,
            };
            let Some(outcome) = next else {
                cancelled = scope.cancel.is_cancelled();
                break;
            };

            let node_id = graph.nodes()[outcome.idx.0].id().to_string();
            match outcome.result {
                Ok(output) => {
                    graph.complete_node(outcome.idx, output)?;
                    debug!(plan_id = %plan_id, node_id = %node_id, elapsed_ms = outcome.elapsed_ms, "Node complete");
                    scope.events.publish(RunEvent::NodeCompleted {
                        plan_id: plan_id.clone(),
                        node_id,
                        elapsed_ms: outcome.elapsed_ms,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    graph.fail_node(outcome.idx, message.clone())?;
                    warn!(plan_id = %plan_id, node_id = %node_id, error = %message, "Node failed");
                    scope.events.publish(RunEvent::NodeFailed {
                        plan_id: plan_id.clone(),
                        node_id: node_id.clone(),
                        error: message.clone(),
                    });
                    if self.failure_policy == FailurePolicy::FailFast && first_failure.is_none() {
                        first_failure = Some((node_id, message));
                    }
                }
            }

            if first_failure.is_none() {
                self.enqueue_ready(graph, &scope, &mut ready, &mut queued);
            }
        }

        if cancelled || aborted.is_some() {
            drop(in_flight);
            let reason = if cancelled { "cancelled" } else { "run aborted" };
            let running: Vec<NodeIndex> = graph
                .indices()
                .filter(|idx| {
                    graph
                        .node(*idx)
                        .is_some_and(|n| n.status() == NodeStatus::InProgress)
                })
                .collect();
            for idx in running {
                graph.fail_node(idx, reason)?;
                scope.events.publish(RunEvent::NodeFailed {
                    plan_id: plan_id.clone(),
                    node_id: graph.nodes()[idx.0].id().to_string(),
                    error: reason.into(),
                });
            }
        }

        let stuck = graph.unfinished_ids();
        let completed = graph.count_with_status(NodeStatus::Complete);
        let failed = graph.count_with_status(NodeStatus::Failed);
        let status = if completed == graph.len() {
            PlanStatus::Complete
        } else {
            PlanStatus::Failed
        };
        graph.set_status(status)?;

        let deadlocked =
            !cancelled && aborted.is_none() && first_failure.is_none() && !stuck.is_empty();
        if deadlocked {
            warn!(plan_id = %plan_id, stuck = ?stuck, "Plan deadlocked");
            scope.events.publish(RunEvent::PlanDeadlocked {
                plan_id: plan_id.clone(),
                stuck: stuck.clone(),
            });
        }

        info!(plan_id = %plan_id, status = %status, completed, failed, "Plan finished");
        scope.events.publish(RunEvent::PlanFinished {
            plan_id: plan_id.clone(),
            status,
            completed,
            failed,
        });

        if cancelled {
            return Err(ScribeError::Cancelled);
        }
        if let Some(e) = aborted {
            warn!(plan_id = %plan_id, error = %e, "Plan aborted");
            return Err(e);
        }
        if let Some((node, message)) = first_failure {
            return Err(ScribeError::NodeFailed { node, message });
        }
        if deadlocked {
            return Err(ScribeError::Deadlock { stuck });
        }
        Ok(())
    }

    /// Queue every idle node whose dependencies are complete, in insertion order.
    fn enqueue_ready(
        &self,
        graph: &PlanGraph,
        scope: &ExecutionScope,
        ready: &mut VecDeque<NodeIndex>,
        queued: &mut HashSet<NodeIndex>,
    ) {
        for idx in graph.indices() {
            let Some(node) = graph.node(idx) else {
                continue;
            };
            if node.status() != NodeStatus::Created || queued.contains(&idx) {
                continue;
            }
            if graph.dependencies_complete(idx) {
                queued.insert(idx);
                ready.push_back(idx);
                scope.events.publish(RunEvent::NodeQueued {
                    plan_id: scope.plan_id.clone(),
                    node_id: node.id().to_string(),
                });
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(1, FailurePolicy::Isolate)
    }
}
