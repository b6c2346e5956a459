//! Mocks and fixtures shared by the Scribe crates' tests.

use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use scribe_core::error::{Result, ScribeError};
use scribe_core::event::EventBus;
use scribe_core::traits::{Capability, Responder, TaskExecutor};
use scribe_core::types::{Context, ExecutionScope, PlanId, Reply, ResponderRequest};

/// Fresh top-level scope with its own event bus and cancel token.
pub fn test_scope() -> ExecutionScope {
    ExecutionScope::new(
        PlanId::from("test-plan"),
        Arc::new(EventBus::default()),
        CancellationToken::new(),
    )
}

/// Build a context from a JSON object literal. Non-objects give an empty map.
pub fn ctx(value: Value) -> Context {
    match value {
        Value::Object(map) => map,
        _ => Context::new(),
    }
}

/// Write `contents` to a temp file that lives as long as the handle.
pub fn temp_file(contents: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(contents.as_bytes()).expect("write temp file");
    tmp
}

// ── Capabilities ────────────────────────────────────────────────

/// Capability named `count` that counts how often its body runs.
///
/// Input is `{"value": integer}`; output is `{"calls": integer}`.
pub struct CountingCapability {
    calls: Arc<AtomicUsize>,
    fail_with: Option<String>,
    output: Option<Value>,
}

impl CountingCapability {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_with: None,
            output: None,
        }
    }

    /// Body always fails with an I/O error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new()
        }
    }

    /// Body returns `output` instead of the call count.
    pub fn with_output(output: Value) -> Self {
        Self {
            output: Some(output),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Default for CountingCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl Capability for CountingCapability {
    fn name(&self) -> &str {
        "count"
    }
    fn description(&self) -> &str {
        "Counts invocations"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "value": { "type": "integer" } },
            "required": ["value"],
            "additionalProperties": false
        })
    }
    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "calls": { "type": "integer" } },
            "required": ["calls"]
        })
    }
    fn execute(&self, _input: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(ref message) = self.fail_with {
                return Err(ScribeError::Io(std::io::Error::other(message.clone())));
            }
            Ok(self.output.clone().unwrap_or_else(|| json!({ "calls": n })))
        })
    }
}

/// Capability named `slow` that sleeps for `delay_ms` before answering.
pub struct SlowCapability {
    limit: Duration,
}

impl SlowCapability {
    /// `limit` becomes the capability's declared execution budget.
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl Capability for SlowCapability {
    fn name(&self) -> &str {
        "slow"
    }
    fn description(&self) -> &str {
        "Sleeps before answering"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "delay_ms": { "type": "integer", "minimum": 0 } },
            "required": ["delay_ms"]
        })
    }
    fn max_execution_time(&self) -> Option<Duration> {
        Some(self.limit)
    }
    fn execute(&self, input: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let delay = input["delay_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(json!({ "slept_ms": delay }))
        })
    }
}

// ── Responders ──────────────────────────────────────────────────

/// Responder that replays a fixed script and records every request.
///
/// Once the script runs out it answers with an empty JSON result.
pub struct ScriptedResponder {
    replies: Mutex<VecDeque<Reply>>,
    requests: Arc<Mutex<Vec<ResponderRequest>>>,
}

impl ScriptedResponder {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Responder that always answers with the same text.
    pub fn text(raw: &str) -> Self {
        Self::new(vec![Reply::Text(raw.to_string())])
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<ResponderRequest>>> {
        self.requests.clone()
    }
}

impl Responder for ScriptedResponder {
    fn respond(&self, request: ResponderRequest) -> BoxFuture<'_, Result<Reply>> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(request);
            let mut replies = self.replies.lock().expect("replies lock");
            let reply = if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            };
            Ok(reply.unwrap_or_else(|| Reply::Text(r#"{"directResult": ""}"#.into())))
        })
    }
}

/// Responder behind the "Adder" executor.
///
/// Answers `{"directResult": "ok", "outputContext": {"value": n}}` where `n`
/// is the numeric `value` of the merged context, defaulting to 1.
pub struct AdderResponder;

impl Responder for AdderResponder {
    fn respond(&self, request: ResponderRequest) -> BoxFuture<'_, Result<Reply>> {
        Box::pin(async move {
            let value = request
                .context
                .get("value")
                .and_then(|v| v.as_f64())
                .unwrap_or(1.0);
            let value = if value.fract() == 0.0 {
                json!(value as i64)
            } else {
                json!(value)
            };
            Ok(Reply::Text(
                json!({ "directResult": "ok", "outputContext": { "value": value } }).to_string(),
            ))
        })
    }
}

// ── Executors ───────────────────────────────────────────────────

/// One call observed by a [`RecordingExecutor`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub executor: String,
    pub node_id: String,
    pub goal: String,
    pub context: Context,
}

pub type CallLog = Arc<Mutex<Vec<RecordedCall>>>;

/// Executor that records every call and answers `{"node": <node id>}`.
pub struct RecordingExecutor {
    name: String,
    log: CallLog,
    fail_on: HashSet<String>,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::new(Mutex::new(Vec::new())),
            fail_on: HashSet::new(),
            delay: None,
        }
    }

    /// Fail when dispatched for any of these node ids.
    pub fn failing_on(mut self, node_ids: &[&str]) -> Self {
        self.fail_on = node_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl TaskExecutor for RecordingExecutor {
    fn id(&self) -> &str {
        &self.name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(
        &'a self,
        goal: &'a str,
        context: &'a Context,
        scope: &'a ExecutionScope,
    ) -> BoxFuture<'a, Result<Context>> {
        Box::pin(async move {
            self.log.lock().expect("call log lock").push(RecordedCall {
                executor: self.name.clone(),
                node_id: scope.node_id.clone(),
                goal: goal.to_string(),
                context: context.clone(),
            });
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_on.contains(&scope.node_id) {
                return Err(ScribeError::executor(&self.name, format!("refused {}", scope.node_id)));
            }
            Ok(ctx(json!({ "node": scope.node_id })))
        })
    }
}

/// Node ids in the order they were dispatched.
pub fn dispatch_order(log: &CallLog) -> Vec<String> {
    log.lock()
        .expect("call log lock")
        .iter()
        .map(|c| c.node_id.clone())
        .collect()
}

// ── Fixture documents ───────────────────────────────────────────

/// Two-node Adder plan: `c2` depends on `c1`.
pub const ADDER_PLAN_JSON: &str = r#"{
  "title": "T",
  "goal": "G",
  "nodes": [
    {"id": "c1", "executorName": "Adder", "goal": "sum"},
    {"id": "c2", "executorName": "Adder", "goal": "double", "dependencies": ["c1"]}
  ]
}"#;

/// The Adder plan in the XML wire shape, with original element names.
pub const ADDER_PLAN_XML: &str = r#"<chronicle>
  <title>T</title>
  <goal>G</goal>
  <chapters>
    <chapter id="c1">
      <targetAgent>Adder</targetAgent>
      <goal>sum</goal>
    </chapter>
    <chapter id="c2">
      <targetAgent>Adder</targetAgent>
      <goal>double</goal>
      <dependencies>
        <dependency>c1</dependency>
      </dependencies>
    </chapter>
  </chapters>
</chronicle>"#;

/// Chain `a -> b -> c`, all on `executor`.
pub fn chain_plan_json(executor: &str) -> String {
    json!({
        "title": "Chain",
        "goal": "run in order",
        "nodes": [
            {"id": "a", "executorName": executor, "goal": "first"},
            {"id": "b", "executorName": executor, "goal": "second", "dependencies": ["a"]},
            {"id": "c", "executorName": executor, "goal": "third", "dependencies": ["b"]}
        ]
    })
    .to_string()
}

/// Diamond `root -> {left, right} -> join`, all on `executor`.
pub fn diamond_plan_json(executor: &str) -> String {
    json!({
        "title": "Diamond",
        "goal": "fan out and join",
        "nodes": [
            {"id": "root", "executorName": executor, "goal": "start"},
            {"id": "left", "executorName": executor, "goal": "left", "dependencies": ["root"]},
            {"id": "right", "executorName": executor, "goal": "right", "dependencies": ["root"]},
            {"id": "join", "executorName": executor, "goal": "join", "dependencies": ["left", "right"]}
        ]
    })
    .to_string()
}
