//! Prepares JSON schemas for each provider's structured-output mode.

use serde_json::{Map, Value};

const GEMINI_COPIED_KEYS: [&str; 5] = ["required", "minItems", "maxItems", "minLength", "format"];

/// OpenAI accepts standard JSON schema; only the `$schema` meta field
/// is stripped
pub fn to_openai(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != "$schema")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Converts a JSON schema to Gemini's `response_schema` dialect: type
/// names become the provider enumeration, objects gain an explicit
/// `propertyOrdering` matching declaration order and forbid unknown
/// properties
pub fn to_gemini(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let without_meta: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| key.as_str() != "$schema")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            convert(&Value::Object(without_meta))
        }
        other => other.clone(),
    }
}

fn convert(node: &Value) -> Value {
    let Value::Object(map) = node else {
        return node.clone();
    };
    let mut result = Map::new();

    if let Some(Value::String(type_name)) = map.get("type") {
        result.insert("type".to_owned(), Value::String(map_type(type_name)));
    }

    if let Some(Value::Object(properties)) = map.get("properties") {
        result.insert(
            "properties".to_owned(),
            Value::Object(
                properties
                    .iter()
                    .map(|(key, value)| (key.clone(), convert(value)))
                    .collect(),
            ),
        );
        result.insert(
            "propertyOrdering".to_owned(),
            Value::Array(
                properties
                    .keys()
                    .map(|key| Value::String(key.clone()))
                    .collect(),
            ),
        );
    }

    if let Some(items) = map.get("items") {
        result.insert("items".to_owned(), convert(items));
    }

    for key in GEMINI_COPIED_KEYS {
        if let Some(value) = map.get(key) {
            result.insert(key.to_owned(), value.clone());
        }
    }

    if result.get("type") == Some(&Value::String("OBJECT".to_owned())) {
        result.insert("additionalProperties".to_owned(), Value::Bool(false));
    }

    Value::Object(result)
}

fn map_type(type_name: &str) -> String {
    match type_name {
        "object" => "OBJECT",
        "string" => "STRING",
        "array" => "ARRAY",
        "number" => "NUMBER",
        "integer" => "INTEGER",
        "boolean" => "BOOLEAN",
        other => other,
    }
    .to_owned()
}
