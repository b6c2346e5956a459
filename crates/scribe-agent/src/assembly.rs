//! Builds executors and the plan runner from an [`AppConfig`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scribe_core::config::{expand_home, AppConfig, ExecutorConfig, ExecutorKind};
use scribe_core::error::{Result, ScribeError};
use scribe_core::event::EventBus;
use scribe_core::traits::{Responder, TaskExecutor};
use scribe_tools::CapabilityRegistry;

use crate::executor::{ExecutorRegistry, PlanningExecutor, SharedExecutorRegistry, SingleShotExecutor};
use crate::planner::StaticPlanner;
use crate::responders::{ContextToolResponder, EchoResponder};
use crate::runner::PlanRunner;

/// Everything a CLI run needs, wired from config.
pub struct Assembly {
    pub runner: PlanRunner,
    pub executors: SharedExecutorRegistry,
}

/// Register every configured executor. Planner executors also become roots
/// of the returned runner and share the executor registry for nested plans.
pub async fn assemble(
    config: &AppConfig,
    events: Arc<EventBus>,
    cancel: CancellationToken,
) -> Result<Assembly> {
    let builtins = CapabilityRegistry::with_builtins();
    let executors = ExecutorRegistry::new().into_shared();
    let mut runner = PlanRunner::new(events).with_cancel(cancel);

    for entry in &config.executors {
        let executor: Arc<dyn TaskExecutor> = match entry.kind {
            ExecutorKind::Echo => Arc::new(single_shot(entry, Arc::new(EchoResponder), &builtins, config)?),
            ExecutorKind::Tool => Arc::new(single_shot(
                entry,
                Arc::new(ContextToolResponder),
                &builtins,
                config,
            )?),
            ExecutorKind::Planner => {
                let planner = Arc::new(planning(entry, executors.clone(), config)?);
                runner.register_planner(planner.clone());
                planner
            }
        };
        debug!(id = %entry.id, name = %entry.name, kind = ?entry.kind, "Executor registered");
        executors.write().await.register(executor);
    }

    Ok(Assembly { runner, executors })
}

/// Root executor id: the explicit request, then `runtime.root_executor`,
/// then the only configured planner.
pub fn resolve_root(config: &AppConfig, requested: Option<&str>) -> Result<String> {
    if let Some(id) = requested.or(config.runtime.root_executor.as_deref()) {
        return Ok(id.to_string());
    }
    let planners: Vec<&ExecutorConfig> = config
        .executors
        .iter()
        .filter(|e| e.kind == ExecutorKind::Planner)
        .collect();
    match planners.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => Err(ScribeError::Config("no planner executor configured".into())),
        _ => Err(ScribeError::Config(
            "several planner executors configured; set runtime.root_executor or pass --executor"
                .into(),
        )),
    }
}

fn single_shot(
    entry: &ExecutorConfig,
    responder: Arc<dyn Responder>,
    builtins: &CapabilityRegistry,
    config: &AppConfig,
) -> Result<SingleShotExecutor> {
    let mut capabilities =
        CapabilityRegistry::new().with_default_timeout(config.capabilities.default_timeout());
    for name in &entry.capabilities {
        let capability = builtins.get(name).ok_or_else(|| {
            ScribeError::Config(format!(
                "executor '{}' lists unknown capability '{}'",
                entry.name, name
            ))
        })?;
        capabilities.register_arc(capability);
    }
    Ok(SingleShotExecutor::new(&entry.id, &entry.name, responder)
        .with_description(&entry.description)
        .with_capabilities(capabilities))
}

fn planning(
    entry: &ExecutorConfig,
    executors: SharedExecutorRegistry,
    config: &AppConfig,
) -> Result<PlanningExecutor> {
    let plan_file = entry.plan_file.as_deref().ok_or_else(|| {
        ScribeError::Config(format!("planner executor '{}' needs plan_file", entry.name))
    })?;
    if !entry.capabilities.is_empty() {
        warn!(executor = %entry.name, "Planner executors own no capabilities; list ignored");
    }
    Ok(PlanningExecutor::new(
        &entry.id,
        &entry.name,
        Arc::new(StaticPlanner::from_file(expand_home(plan_file))),
        executors,
    )
    .with_description(&entry.description)
    .with_runtime(config.runtime.clone()))
}
