pub mod assembly;
pub mod executor;
pub mod graph;
pub mod parse;
pub mod planner;
pub mod responders;
pub mod run_log;
pub mod runner;
pub mod scheduler;
pub mod synthesis;

pub use assembly::{assemble, resolve_root, Assembly};
pub use executor::{
    ExecutorRegistry, FnExecutor, PlanningExecutor, SharedExecutorRegistry, SingleShotExecutor,
};
pub use graph::{merged_context, DependencyRef, Node, NodeIndex, NodeSnapshot, PlanGraph};
pub use parse::{DocumentParser, ParsedResult, ResultParser};
pub use planner::StaticPlanner;
pub use responders::{ContextToolResponder, EchoResponder};
pub use run_log::RunLogger;
pub use runner::{NodeReport, PlanRunner, RunOutcome, RunReport};
pub use scheduler::Scheduler;
pub use synthesis::{synthesize, to_document, ExecutorLookup, NodeLookup};
