//! Minimal JSON Schema checker for capability input/output.
//!
//! Supports the subset capabilities actually declare: `type`, `const`, `enum`,
//! `required`, `properties`, `additionalProperties: false`, `items`,
//! `minItems`/`maxItems`, `minLength`/`maxLength`, `pattern`,
//! `minimum`/`maximum`. Unknown keywords are ignored. A `null` or empty
//! schema accepts every value.

use regex::Regex;
use serde_json::Value;

/// Check `value` against `schema`, returning the first violation found.
pub fn validate(value: &Value, schema: &Value) -> Result<(), String> {
    if schema.is_null() {
        return Ok(());
    }
    validate_at(value, schema, "$")
}

fn validate_at(value: &Value, schema: &Value, path: &str) -> Result<(), String> {
    let schema_obj = schema
        .as_object()
        .ok_or_else(|| format!("schema at '{}' must be an object", path))?;

    if let Some(type_spec) = schema_obj.get("type") {
        validate_type(value, type_spec, path)?;
    }

    if let Some(constant) = schema_obj.get("const") {
        if value != constant {
            return Err(format!("{} expected const {}", path, constant));
        }
    }

    if let Some(variants) = schema_obj.get("enum").and_then(|v| v.as_array()) {
        if !variants.iter().any(|candidate| candidate == value) {
            return Err(format!("{} is not one of the allowed enum values", path));
        }
    }

    if let Some(required) = schema_obj.get("required").and_then(|v| v.as_array()) {
        let object = value
            .as_object()
            .ok_or_else(|| format!("{} must be an object for required fields", path))?;
        for key in required.iter().filter_map(|v| v.as_str()) {
            if !object.contains_key(key) {
                return Err(format!("{} missing required field '{}'", path, key));
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(|v| v.as_object()) {
        if let Some(object) = value.as_object() {
            for (key, property_schema) in properties {
                if let Some(child) = object.get(key) {
                    validate_at(child, property_schema, &format!("{}.{}", path, key))?;
                }
            }

            if schema_obj.get("additionalProperties").and_then(|v| v.as_bool()) == Some(false) {
                if let Some(unknown) = object.keys().find(|k| !properties.contains_key(*k)) {
                    return Err(format!("{} contains unknown field '{}'", path, unknown));
                }
            }
        }
    }

    if let Some(array) = value.as_array() {
        if let Some(min) = schema_obj.get("minItems").and_then(|v| v.as_u64()) {
            if (array.len() as u64) < min {
                return Err(format!("{} must have at least {} items", path, min));
            }
        }
        if let Some(max) = schema_obj.get("maxItems").and_then(|v| v.as_u64()) {
            if (array.len() as u64) > max {
                return Err(format!("{} must have at most {} items", path, max));
            }
        }
        if let Some(item_schema) = schema_obj.get("items") {
            for (idx, item) in array.iter().enumerate() {
                validate_at(item, item_schema, &format!("{}[{}]", path, idx))?;
            }
        }
    }

    if let Some(text) = value.as_str() {
        let len = text.chars().count() as u64;
        if let Some(min) = schema_obj.get("minLength").and_then(|v| v.as_u64()) {
            if len < min {
                return Err(format!("{} must be at least {} characters", path, min));
            }
        }
        if let Some(max) = schema_obj.get("maxLength").and_then(|v| v.as_u64()) {
            if len > max {
                return Err(format!("{} must be at most {} characters", path, max));
            }
        }
        if let Some(pattern) = schema_obj.get("pattern").and_then(|v| v.as_str()) {
            let re = Regex::new(pattern)
                .map_err(|e| format!("{} has invalid pattern '{}': {}", path, pattern, e))?;
            if !re.is_match(text) {
                return Err(format!("{} does not match pattern '{}'", path, pattern));
            }
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = schema_obj.get("minimum").and_then(|v| v.as_f64()) {
            if number < min {
                return Err(format!("{} must be >= {}", path, min));
            }
        }
        if let Some(max) = schema_obj.get("maximum").and_then(|v| v.as_f64()) {
            if number > max {
                return Err(format!("{} must be <= {}", path, max));
            }
        }
    }

    Ok(())
}

fn validate_type(value: &Value, type_spec: &Value, path: &str) -> Result<(), String> {
    let matches = |t: &str, v: &Value| match t {
        "object" => v.is_object(),
        "array" => v.is_array(),
        "string" => v.is_string(),
        "number" => v.is_number(),
        "integer" => v.is_i64() || v.is_u64(),
        "boolean" => v.is_boolean(),
        "null" => v.is_null(),
        _ => false,
    };

    match type_spec {
        Value::String(type_name) => {
            if matches(type_name, value) {
                Ok(())
            } else {
                Err(format!("{} expected type '{}'", path, type_name))
            }
        }
        Value::Array(types) => {
            if types
                .iter()
                .filter_map(|t| t.as_str())
                .any(|t| matches(t, value))
            {
                Ok(())
            } else {
                Err(format!("{} did not match any allowed types", path))
            }
        }
        _ => Err(format!("{} schema.type must be string or array", path)),
    }
}
