use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use scribe_core::error::{Result, ScribeError};
use scribe_core::schema;
use scribe_core::traits::{Capability, DEFAULT_MAX_EXECUTION_TIME};
use scribe_core::types::{ExecutionScope, RunEvent};

/// Invoke a capability under its own execution budget.
///
/// Capabilities that leave the budget unset get [`DEFAULT_MAX_EXECUTION_TIME`].
pub async fn invoke(
    capability: &dyn Capability,
    input: Value,
    scope: &ExecutionScope,
) -> Result<Value> {
    let limit = capability
        .max_execution_time()
        .unwrap_or(DEFAULT_MAX_EXECUTION_TIME);
    invoke_with_limit(capability, input, scope, limit).await
}

/// Validate input, race the body against `limit` and the scope's cancel
/// token, then validate output.
///
/// A zero `limit` means no time limit. On timeout the body future is dropped.
pub async fn invoke_with_limit(
    capability: &dyn Capability,
    input: Value,
    scope: &ExecutionScope,
    limit: Duration,
) -> Result<Value> {
    let name = capability.name().to_string();
    let start = Instant::now();

    let result = run_contract(capability, &name, input, scope, limit).await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => debug!(capability = %name, node_id = %scope.node_id, elapsed_ms, "Capability succeeded"),
        Err(e) => warn!(capability = %name, node_id = %scope.node_id, elapsed_ms, error = %e, "Capability failed"),
    }
    scope.events.publish(RunEvent::CapabilityInvoked {
        plan_id: scope.plan_id.clone(),
        node_id: scope.node_id.clone(),
        capability: name,
        elapsed_ms,
        ok: result.is_ok(),
    });

    result
}

async fn run_contract(
    capability: &dyn Capability,
    name: &str,
    input: Value,
    scope: &ExecutionScope,
    limit: Duration,
) -> Result<Value> {
    schema::validate(&input, &capability.input_schema()).map_err(|reason| {
        ScribeError::Validation {
            capability: name.to_string(),
            stage: "input".into(),
            reason,
        }
    })?;

    if scope.cancel.is_cancelled() {
        return Err(ScribeError::Cancelled);
    }

    let body = capability.execute(input);
    let outcome = tokio::select! {
        biased;
        _ = scope.cancel.cancelled() => return Err(ScribeError::Cancelled),
        outcome = bounded(body, limit) => outcome,
    };

    let output = match outcome {
        None => {
            return Err(ScribeError::Timeout {
                capability: name.to_string(),
                timeout_ms: limit.as_millis() as u64,
            })
        }
        Some(Ok(output)) => output,
        Some(Err(e @ ScribeError::Validation { .. })) => return Err(e),
        Some(Err(e)) => {
            return Err(ScribeError::Capability {
                capability: name.to_string(),
                cause: e.to_string(),
            })
        }
    };

    schema::validate(&output, &capability.output_schema()).map_err(|reason| {
        ScribeError::Validation {
            capability: name.to_string(),
            stage: "output".into(),
            reason,
        }
    })?;

    Ok(output)
}

/// `None` when the budget expired first.
async fn bounded(body: BoxFuture<'_, Result<Value>>, limit: Duration) -> Option<Result<Value>> {
    if limit.is_zero() {
        Some(body.await)
    } else {
        tokio::time::timeout(limit, body).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_test_utils::{test_scope, CountingCapability, SlowCapability};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn invalid_input_never_reaches_body() {
        let cap = CountingCapability::new();
        let calls = cap.calls();
        let scope = test_scope();

        let err = invoke(&cap, json!({"operands": "nope"}), &scope)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScribeError::Validation { ref stage, .. } if stage == "input"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_input_runs_body() {
        let cap = CountingCapability::new();
        let calls = cap.calls();
        let out = invoke(&cap, json!({"value": 3}), &test_scope())
            .await
            .unwrap();
        assert_eq!(out, json!({"calls": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_does_not_leak_into_next_call() {
        let cap = SlowCapability::new(Duration::from_millis(50));
        let scope = test_scope();

        let err = invoke(&cap, json!({"delay_ms": 500}), &scope)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScribeError::Timeout { timeout_ms: 50, .. }
        ));

        let out = invoke(&cap, json!({"delay_ms": 10}), &scope).await.unwrap();
        assert_eq!(out, json!({"slept_ms": 10}));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limit_means_unbounded() {
        let cap = SlowCapability::new(Duration::from_millis(1));
        let out = invoke_with_limit(&cap, json!({"delay_ms": 5_000}), &test_scope(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(out, json!({"slept_ms": 5000}));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_the_race() {
        let cap = SlowCapability::new(Duration::from_secs(60));
        let scope = test_scope();
        let cancel = scope.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel.cancel();
        });

        let err = invoke(&cap, json!({"delay_ms": 10_000}), &scope)
            .await
            .unwrap_err();
        assert!(matches!(err, ScribeError::Cancelled));
    }

    #[tokio::test]
    async fn body_errors_are_wrapped() {
        let cap = CountingCapability::failing("disk on fire");
        let err = invoke(&cap, json!({"value": 1}), &test_scope())
            .await
            .unwrap_err();
        match err {
            ScribeError::Capability { capability, cause } => {
                assert_eq!(capability, "count");
                assert!(cause.contains("disk on fire"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn invalid_output_is_rejected() {
        let cap = CountingCapability::with_output(json!({"calls": "many"}));
        let err = invoke(&cap, json!({"value": 1}), &test_scope())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScribeError::Validation { ref stage, .. } if stage == "output"
        ));
    }

    #[tokio::test]
    async fn invocation_is_published() {
        let cap = CountingCapability::new();
        let scope = test_scope();
        let mut rx = scope.events.subscribe();
        invoke(&cap, json!({"value": 1}), &scope).await.unwrap();
        match rx.recv().await.unwrap() {
            RunEvent::CapabilityInvoked { capability, ok, .. } => {
                assert_eq!(capability, "count");
                assert!(ok);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
