use futures::future::BoxFuture;

use scribe_core::error::Result;
use scribe_core::traits::TaskExecutor;
use scribe_core::types::{Context, ExecutionScope};

type ExecFn = dyn Fn(&str, &Context) -> Result<Context> + Send + Sync;

/// Executor backed by a plain closure. Handy for embedding and tests.
pub struct FnExecutor {
    id: String,
    name: String,
    description: String,
    f: Box<ExecFn>,
}

impl FnExecutor {
    pub fn new<F>(id: impl Into<String>, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str, &Context) -> Result<Context> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            f: Box::new(f),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl TaskExecutor for FnExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute<'a>(
        &'a self,
        goal: &'a str,
        context: &'a Context,
        _scope: &'a ExecutionScope,
    ) -> BoxFuture<'a, Result<Context>> {
        Box::pin(async move { (self.f)(goal, context) })
    }
}
