//! Built-in responders for single-shot executors configured without a model.

use futures::future::BoxFuture;
use serde_json::{json, Value};

use scribe_core::error::Result;
use scribe_core::traits::Responder;
use scribe_core::types::{Reply, ResponderRequest};

/// Echoes the goal as the direct result and `{goal, context}` as the output.
pub struct EchoResponder;

fn echo(request: &ResponderRequest) -> Reply {
    Reply::Text(
        json!({
            "directResult": request.goal,
            "outputContext": {
                "goal": request.goal,
                "context": Value::Object(request.context.clone()),
            }
        })
        .to_string(),
    )
}

impl Responder for EchoResponder {
    fn respond(&self, request: ResponderRequest) -> BoxFuture<'_, Result<Reply>> {
        Box::pin(async move { Ok(echo(&request)) })
    }
}

/// Requests a capability named by the context.
///
/// A string `tool` key in the merged context selects the capability and the
/// `input` key (default `{}`) becomes its input. Without `tool` it echoes.
pub struct ContextToolResponder;

impl Responder for ContextToolResponder {
    fn respond(&self, request: ResponderRequest) -> BoxFuture<'_, Result<Reply>> {
        Box::pin(async move {
            let Some(name) = request.context.get("tool").and_then(Value::as_str) else {
                return Ok(echo(&request));
            };
            let input = request
                .context
                .get("input")
                .cloned()
                .unwrap_or_else(|| json!({}));
            Ok(Reply::ToolUse {
                name: name.to_string(),
                input,
            })
        })
    }
}
