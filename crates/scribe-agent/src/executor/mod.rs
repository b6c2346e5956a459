//! Task executors: the units that perform a node's work.
//!
//! The scheduler only sees `Arc<dyn TaskExecutor>`; the variants here are
//! single-shot (one responder reply, optionally one capability call),
//! planning (a nested plan run), and closure-backed.

pub mod fn_executor;
pub mod planning;
pub mod registry;
pub mod single_shot;

pub use fn_executor::FnExecutor;
pub use planning::PlanningExecutor;
pub use registry::{ExecutorRegistry, SharedExecutorRegistry};
pub use single_shot::SingleShotExecutor;
