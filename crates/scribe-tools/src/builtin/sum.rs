use futures::future::BoxFuture;
use serde::Deserialize;

use scribe_core::error::Result;
use scribe_core::traits::Capability;

/// Adds numeric operands.
pub struct SumCapability;

#[derive(Deserialize)]
struct SumInput {
    operands: Vec<f64>,
}

impl Capability for SumCapability {
    fn name(&self) -> &str {
        "sum"
    }
    fn description(&self) -> &str {
        "Adds a list of numbers and returns the sum and the operand count."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operands": {
                    "type": "array",
                    "items": { "type": "number" },
                    "minItems": 2
                }
            },
            "required": ["operands"],
            "additionalProperties": false
        })
    }
    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sum": { "type": "number" },
                "count": { "type": "integer" }
            },
            "required": ["sum", "count"],
            "additionalProperties": false
        })
    }
    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: SumInput = serde_json::from_value(input)?;
            let sum: f64 = p.operands.iter().sum();
            Ok(serde_json::json!({
                "sum": sum,
                "count": p.operands.len(),
            }))
        })
    }
}
