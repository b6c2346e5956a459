use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScribeError};

/// Top-level Scribe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub executors: Vec<ExecutorConfig>,
}

/// What the scheduler does after a node fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and keep running independent branches.
    #[default]
    Isolate,
    /// Stop dispatching after the first failure.
    FailFast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Ceiling on nodes per plan, checked before scheduling.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    /// Ready nodes dispatched concurrently. 1 keeps the serial reference order.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Maximum nesting of planning executors.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Executor id used by `scribe run` when none is given.
    #[serde(default)]
    pub root_executor: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            max_parallel: default_max_parallel(),
            failure_policy: FailurePolicy::default(),
            max_depth: default_max_depth(),
            root_executor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl CapabilitiesConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

/// JSONL run logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// Single-shot executor that echoes goal and context.
    Echo,
    /// Single-shot executor that turns `tool`/`input` context keys into a capability call.
    Tool,
    /// Planning executor backed by a static plan file.
    Planner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ExecutorKind,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Plan document read by `planner` executors.
    #[serde(default)]
    pub plan_file: Option<String>,
}

fn default_max_nodes() -> usize { 6 }
fn default_max_parallel() -> usize { 1 }
fn default_max_depth() -> usize { 3 }
fn default_timeout_ms() -> u64 { 30_000 }
fn default_log_dir() -> String { "~/.scribe/logs".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ScribeError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| ScribeError::Config(e.to_string()))?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            executors = config.executors.len(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Reject settings the runtime cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.max_parallel == 0 {
            return Err(ScribeError::Config(
                "runtime.max_parallel must be at least 1".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for executor in &self.executors {
            if !seen.insert(executor.name.as_str()) {
                return Err(ScribeError::Config(format!(
                    "duplicate executor name '{}'",
                    executor.name
                )));
            }
            if executor.kind == ExecutorKind::Planner && executor.plan_file.is_none() {
                return Err(ScribeError::Config(format!(
                    "planner executor '{}' needs plan_file",
                    executor.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve the run log directory (expand ~).
    pub fn log_dir(&self) -> PathBuf {
        expand_home(&self.log.dir)
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
