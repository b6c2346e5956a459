use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScribeError {
    // Construction errors
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Unresolved reference: {0}")]
    Reference(String),

    #[error("Plan has too many nodes: {count} (limit {limit})")]
    PlanTooLarge { count: usize, limit: usize },

    // Capability errors
    #[error("Validation failed for {capability} {stage}: {reason}")]
    Validation {
        capability: String,
        stage: String,
        reason: String,
    },

    #[error("Capability timeout after {timeout_ms}ms: {capability}")]
    Timeout { capability: String, timeout_ms: u64 },

    #[error("Capability failed: {capability}: {cause}")]
    Capability { capability: String, cause: String },

    // Executor errors
    #[error("Executor failed: {executor}: {message}")]
    Executor { executor: String, message: String },

    // Scheduling errors
    #[error("Node {node} dispatched before dependency {dependency} produced output")]
    Dependency { node: String, dependency: String },

    #[error("Deadlock: no path to readiness for nodes: {}", stuck.join(", "))]
    Deadlock { stuck: Vec<String> },

    #[error("Node {node} failed: {message}")]
    NodeFailed { node: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    // Collaborator errors
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Planner error: {0}")]
    Planner(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScribeError {
    /// Build an executor error for the named executor.
    pub fn executor(executor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Executor {
            executor: executor.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScribeError>;
