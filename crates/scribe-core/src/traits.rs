use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Default budget for a single capability call.
pub const DEFAULT_MAX_EXECUTION_TIME: Duration = Duration::from_secs(30);

/// Capability: an atomic, schema-checked unit of work.
///
/// Implementations only provide the body. Validation and the timeout race
/// live in the invocation contract (`scribe_tools::invoke`).
pub trait Capability: Send + Sync + 'static {
    /// Capability name (used in tool-use replies).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for input. `{}` accepts anything.
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    /// JSON Schema for output. `{}` accepts anything.
    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    /// Hard execution budget. `None` defers to the registry default;
    /// `Duration::ZERO` disables the limit.
    fn max_execution_time(&self) -> Option<Duration> {
        None
    }

    /// Run the capability body on already validated input.
    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Description sent to responders.
    fn definition(&self) -> CapabilityDefinition {
        CapabilityDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            output_schema: self.output_schema(),
            max_execution_time_ms: self
                .max_execution_time()
                .unwrap_or(DEFAULT_MAX_EXECUTION_TIME)
                .as_millis() as u64,
        }
    }
}

/// Task executor: performs the work of one plan node.
///
/// The scheduler only ever calls `execute`; it never looks at which kind of
/// executor it holds.
pub trait TaskExecutor: Send + Sync + 'static {
    /// Stable identifier.
    fn id(&self) -> &str;

    /// Name referenced by plan documents.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Definitions of the capabilities this executor owns.
    fn capabilities(&self) -> Vec<CapabilityDefinition> {
        vec![]
    }

    /// Perform `goal` with the merged `context`.
    ///
    /// The returned map becomes the node's output context verbatim.
    fn execute<'a>(
        &'a self,
        goal: &'a str,
        context: &'a Context,
        scope: &'a ExecutionScope,
    ) -> BoxFuture<'a, Result<Context>>;
}

/// Responder: the text producer behind a single-shot executor (an LLM in
/// production).
pub trait Responder: Send + Sync + 'static {
    fn respond(&self, request: ResponderRequest) -> BoxFuture<'_, Result<Reply>>;
}

/// Planner: turns a free-form command into a raw plan document.
pub trait Planner: Send + Sync + 'static {
    /// Produce raw text (JSON or XML) describing a plan.
    ///
    /// Failures are reported as `ScribeError::Planner`.
    fn generate_plan<'a>(
        &'a self,
        command: &'a str,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Capability for Noop {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn max_execution_time(&self) -> Option<Duration> {
            Some(Duration::from_millis(250))
        }
        fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
            Box::pin(async move { Ok(input) })
        }
    }

    struct Plain;

    impl Capability for Plain {
        fn name(&self) -> &str {
            "plain"
        }
        fn description(&self) -> &str {
            ""
        }
        fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
            Box::pin(async move { Ok(input) })
        }
    }

    #[test]
    fn definition_reflects_capability() {
        let def = Noop.definition();
        assert_eq!(def.name, "noop");
        assert_eq!(def.max_execution_time_ms, 250);
        assert_eq!(def.input_schema, serde_json::json!({}));
    }

    #[test]
    fn definition_falls_back_to_default_budget() {
        assert_eq!(Plain.definition().max_execution_time_ms, 30_000);
    }
}
