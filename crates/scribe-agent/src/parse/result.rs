use serde_json::Value;
use tracing::debug;

use scribe_core::types::Context;

use super::xml::parse_tree;
use super::{looks_like_xml, strip_code_fences};

/// Decoded executor output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResult {
    pub direct_result: String,
    pub output_context: Context,
}

impl ParsedResult {
    fn fallback(raw: &str) -> Self {
        Self {
            direct_result: raw.to_string(),
            output_context: Context::new(),
        }
    }
}

/// Decodes responder text or capability output into a [`ParsedResult`].
///
/// Accepts `{"directResult": ..., "outputContext": {...}}` or
/// `<response><directResult/><outputContext><context name="k">v</context>
/// </outputContext></response>`. Anything else falls back to the raw text as
/// `direct_result` with an empty context.
pub struct ResultParser;

impl ResultParser {
    pub fn parse(raw: &str) -> ParsedResult {
        let text = strip_code_fences(raw);
        let parsed = if looks_like_xml(&text) {
            from_xml(&text)
        } else {
            serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| from_envelope(&v))
        };
        parsed.unwrap_or_else(|| {
            debug!(len = raw.len(), "Result was not structured, using raw text");
            ParsedResult::fallback(raw)
        })
    }

    /// Same rules for a structured capability output. An object without the
    /// envelope fields becomes the output context itself.
    pub fn parse_value(value: &Value) -> ParsedResult {
        match value {
            Value::String(text) => Self::parse(text),
            Value::Object(map) => from_envelope(value).unwrap_or_else(|| ParsedResult {
                direct_result: value.to_string(),
                output_context: map.clone(),
            }),
            other => ParsedResult::fallback(&other.to_string()),
        }
    }
}

fn from_envelope(value: &Value) -> Option<ParsedResult> {
    let obj = value.as_object()?;
    if !obj.contains_key("directResult") && !obj.contains_key("outputContext") {
        return None;
    }
    let direct_result = match obj.get("directResult") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let output_context = match obj.get("outputContext") {
        None | Some(Value::Null) => Context::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return None,
    };
    Some(ParsedResult {
        direct_result,
        output_context,
    })
}

fn from_xml(text: &str) -> Option<ParsedResult> {
    let root = parse_tree(text).ok()?;
    if root.name != "response" {
        return None;
    }
    let direct_result = root.child_text(&["directResult"]).unwrap_or_default();

    let mut output_context = Context::new();
    if let Some(out) = root.child("outputContext") {
        for entry in out.children_named("context") {
            let name = entry.attr("name")?;
            output_context.insert(name.to_string(), Value::String(entry.text.trim().to_string()));
        }
    }
    Some(ParsedResult {
        direct_result,
        output_context,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_envelope() {
        let parsed = ResultParser::parse(r#"{"directResult": "ok", "outputContext": {"value": 1}}"#);
        assert_eq!(parsed.direct_result, "ok");
        assert_eq!(parsed.output_context["value"], json!(1));
    }

    #[test]
    fn test_xml_envelope() {
        let raw = r#"```xml
<response>
  <directResult>done</directResult>
  <outputContext>
    <context name="city">Lisbon</context>
    <context name="country">Portugal</context>
  </outputContext>
</response>
```"#;
        let parsed = ResultParser::parse(raw);
        assert_eq!(parsed.direct_result, "done");
        assert_eq!(parsed.output_context["city"], json!("Lisbon"));
        assert_eq!(parsed.output_context.len(), 2);
    }

    #[test]
    fn test_malformed_falls_back_to_raw_text() {
        for raw in [
            "just some prose",
            "{\"directResult\": ",
            "<response><context></response>",
            "{\"answer\": 42}",
            "<response><outputContext><context>v</context></outputContext></response>",
        ] {
            let parsed = ResultParser::parse(raw);
            assert_eq!(parsed.direct_result, raw);
            assert!(parsed.output_context.is_empty());
        }
    }

    #[test]
    fn test_backticks_in_direct_result_keep_context() {
        let raw = r#"{"directResult": "run ```ls``` first", "outputContext": {"k": 1}}"#;
        let parsed = ResultParser::parse(raw);
        assert_eq!(parsed.direct_result, "run ```ls``` first");
        assert_eq!(parsed.output_context["k"], json!(1));
    }

    #[test]
    fn test_value_without_envelope_is_context() {
        let parsed = ResultParser::parse_value(&json!({"sum": 3.0, "count": 2}));
        assert_eq!(parsed.output_context["sum"], json!(3.0));
        assert_eq!(parsed.output_context["count"], json!(2));
    }

    #[test]
    fn test_value_with_envelope() {
        let parsed =
            ResultParser::parse_value(&json!({"directResult": "x", "outputContext": {"k": "v"}}));
        assert_eq!(parsed.direct_result, "x");
        assert_eq!(parsed.output_context["k"], json!("v"));
    }

    #[test]
    fn test_scalar_value_falls_back() {
        let parsed = ResultParser::parse_value(&json!(5));
        assert_eq!(parsed.direct_result, "5");
        assert!(parsed.output_context.is_empty());
    }
}
