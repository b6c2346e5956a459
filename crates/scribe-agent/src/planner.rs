use std::path::PathBuf;

use futures::future::BoxFuture;
use tracing::debug;

use scribe_core::error::{Result, ScribeError};
use scribe_core::traits::Planner;
use scribe_core::types::Context;

enum PlanSource {
    Inline(String),
    File(PathBuf),
}

/// Planner that ignores the command and returns a fixed plan document.
///
/// Stands in for a model-backed planner in the CLI and in tests. File-backed
/// planners re-read the file on every call.
pub struct StaticPlanner {
    source: PlanSource,
}

impl StaticPlanner {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            source: PlanSource::Inline(text.into()),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: PlanSource::File(path.into()),
        }
    }
}

impl Planner for StaticPlanner {
    fn generate_plan<'a>(
        &'a self,
        command: &'a str,
        _context: &'a Context,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let text = match &self.source {
                PlanSource::Inline(text) => text.clone(),
                PlanSource::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                    ScribeError::Planner(format!("cannot read plan file {}: {}", path.display(), e))
                })?,
            };
            if text.trim().is_empty() {
                return Err(ScribeError::Planner("planner produced an empty plan".into()));
            }
            debug!(command = %command, len = text.len(), "Static plan produced");
            Ok(text)
        })
    }
}
