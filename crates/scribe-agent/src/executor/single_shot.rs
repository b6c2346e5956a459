use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use scribe_core::error::{Result, ScribeError};
use scribe_core::traits::{Capability, Responder, TaskExecutor};
use scribe_core::types::{CapabilityDefinition, Context, ExecutionScope, Reply, ResponderRequest};
use scribe_tools::CapabilityRegistry;

use crate::parse::ResultParser;

/// Executor that asks its responder once and turns the reply into a result.
///
/// A text reply is decoded by [`ResultParser`]. A tool-use reply runs one of
/// the executor's own capabilities through the invocation contract and
/// decodes the capability output the same way. Only the output context
/// becomes the node result; the direct result is logged.
pub struct SingleShotExecutor {
    id: String,
    name: String,
    description: String,
    responder: Arc<dyn Responder>,
    capabilities: CapabilityRegistry,
}

impl SingleShotExecutor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            responder,
            capabilities: CapabilityRegistry::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replace the owned capability registry.
    pub fn with_capabilities(mut self, capabilities: CapabilityRegistry) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Add a capability to the owned registry.
    pub fn add_capability(&mut self, capability: impl Capability) {
        self.capabilities.register(capability);
    }

    pub fn capability_registry(&self) -> &CapabilityRegistry {
        &self.capabilities
    }
}

impl TaskExecutor for SingleShotExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn capabilities(&self) -> Vec<CapabilityDefinition> {
        self.capabilities.definitions()
    }

    fn execute<'a>(
        &'a self,
        goal: &'a str,
        context: &'a Context,
        scope: &'a ExecutionScope,
    ) -> BoxFuture<'a, Result<Context>> {
        Box::pin(async move {
            let request = ResponderRequest {
                executor: self.name.clone(),
                goal: goal.to_string(),
                context: context.clone(),
                capabilities: self.capabilities.definitions(),
            };

            let reply = self
                .responder
                .respond(request)
                .await
                .map_err(|e| ScribeError::executor(&self.name, e.to_string()))?;

            let parsed = match reply {
                Reply::Text(raw) => ResultParser::parse(&raw),
                Reply::ToolUse { name, input } => {
                    debug!(executor = %self.name, node_id = %scope.node_id, capability = %name, "Responder requested capability");
                    let output = self.capabilities.invoke(&name, input, scope).await?;
                    ResultParser::parse_value(&output)
                }
            };

            debug!(
                executor = %self.name,
                node_id = %scope.node_id,
                direct_result = %parsed.direct_result,
                keys = parsed.output_context.len(),
                "Executor produced result"
            );
            Ok(parsed.output_context)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_test_utils::{ctx, test_scope, AdderResponder, CountingCapability, ScriptedResponder};
    use scribe_tools::builtin::SumCapability;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_text_reply_becomes_output_context() {
        let exec = SingleShotExecutor::new("adder", "Adder", Arc::new(AdderResponder));
        let out = exec
            .execute("double", &ctx(json!({"value": 4})), &test_scope())
            .await
            .unwrap();
        assert_eq!(out, ctx(json!({"value": 4})));
    }

    #[tokio::test]
    async fn test_unstructured_reply_gives_empty_context() {
        let exec = SingleShotExecutor::new(
            "w",
            "Writer",
            Arc::new(ScriptedResponder::text("I wrote a poem.")),
        );
        let out = exec.execute("poem", &Context::new(), &test_scope()).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_request_carries_goal_context_and_capabilities() {
        let responder = Arc::new(ScriptedResponder::text("{}"));
        let requests = responder.requests();
        let mut exec = SingleShotExecutor::new("calc", "Calculator", responder);
        exec.add_capability(SumCapability);

        let input = ctx(json!({"c1": {"goal": "sum", "result": {"value": 1}}}));
        exec.execute("add", &input, &test_scope()).await.unwrap();

        let seen = requests.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].executor, "Calculator");
        assert_eq!(seen[0].goal, "add");
        assert_eq!(seen[0].context, input);
        assert_eq!(seen[0].capabilities[0].name, "sum");
    }

    #[tokio::test]
    async fn test_tool_use_runs_owned_capability() {
        let responder = Arc::new(ScriptedResponder::new(vec![Reply::ToolUse {
            name: "sum".into(),
            input: json!({"operands": [2, 5]}),
        }]));
        let mut exec = SingleShotExecutor::new("calc", "Calculator", responder);
        exec.add_capability(SumCapability);

        let out = exec.execute("add", &Context::new(), &test_scope()).await.unwrap();
        assert_eq!(out, ctx(json!({"sum": 7.0, "count": 2})));
    }

    #[tokio::test]
    async fn test_tool_use_validation_failure_fails_node() {
        let counting = CountingCapability::new();
        let calls = counting.calls();
        let responder = Arc::new(ScriptedResponder::new(vec![Reply::ToolUse {
            name: "count".into(),
            input: json!({"value": "not a number"}),
        }]));
        let mut exec = SingleShotExecutor::new("c", "Counter", responder);
        exec.add_capability(counting);

        let err = exec.execute("count", &Context::new(), &test_scope()).await.unwrap_err();
        assert!(matches!(err, ScribeError::Validation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_capability_fails_node() {
        let responder = Arc::new(ScriptedResponder::new(vec![Reply::ToolUse {
            name: "multiply".into(),
            input: json!({}),
        }]));
        let exec = SingleShotExecutor::new("c", "Calculator", responder);
        let err = exec.execute("x", &Context::new(), &test_scope()).await.unwrap_err();
        assert!(matches!(err, ScribeError::Reference(_)));
    }
}
