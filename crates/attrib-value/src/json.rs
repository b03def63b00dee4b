// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Conversion between JSON documents and [`Value`] trees.
//!
//! JSON integers that fit in `i32` become [`Value::I32`], wider ones
//! [`Value::I64`], and any other number [`Value::F64`]. JSON has no type the
//! boundary cannot carry except booleans and out-of-range unsigned integers;
//! both fall back to `String` text, matching how the native side has always
//! received them.

use serde_json::{Map, Number};
use thiserror::Error;

use crate::{format_f32, Dictionary, Value};

/// Errors raised when a JSON document cannot be a payload root.
#[derive(Debug, Error)]
pub enum JsonError {
    /// Payload roots must be JSON objects.
    #[error("payload root must be a JSON object, found {found}")]
    NotAnObject {
        /// Name of the JSON type that was found instead.
        found: &'static str,
    },
    /// Text was not valid JSON.
    #[error("invalid json: {0}")]
    Syntax(#[from] serde_json::Error),
}

impl Value {
    /// Build a value tree from a JSON document.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::from(*b),
            serde_json::Value::Number(n) => number_to_value(n),
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Self::Array(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Dict(Dictionary::from_json_object(map)),
        }
    }

    /// Render the tree as JSON. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::I32(n) => serde_json::Value::from(*n),
            Self::I64(n) => serde_json::Value::from(*n),
            // Go through the shortest text so 1.235f32 stays 1.235 instead of
            // picking up widening noise.
            Self::F32(f) => format_f32(*f)
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::F64(f) => {
                Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Dict(dict) => serde_json::Value::Object(dict.to_json_object()),
        }
    }
}

impl Dictionary {
    /// Build a dictionary from a JSON object, keeping key order as parsed.
    pub fn from_json_object(map: &Map<String, serde_json::Value>) -> Self {
        map.iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect()
    }

    /// Parse JSON text whose root must be an object.
    pub fn from_json_str(text: &str) -> Result<Self, JsonError> {
        match serde_json::from_str::<serde_json::Value>(text)? {
            serde_json::Value::Object(map) => Ok(Self::from_json_object(&map)),
            other => Err(JsonError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }

    /// Render as a JSON object.
    pub fn to_json_object(&self) -> Map<String, serde_json::Value> {
        self.iter().map(|(k, v)| (k.to_owned(), v.to_json())).collect()
    }
}

fn number_to_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        return i32::try_from(i).map_or(Value::I64(i), Value::I32);
    }
    if n.is_u64() {
        // Above i64::MAX: no integer kind can hold it.
        return Value::Str(n.to_string());
    }
    n.as_f64().map_or_else(|| Value::Str(n.to_string()), Value::F64)
}

const fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_pick_the_narrowest_kind() {
        assert_eq!(Value::from_json(&json!(7)), Value::I32(7));
        assert_eq!(
            Value::from_json(&json!(5_000_000_000_i64)),
            Value::I64(5_000_000_000)
        );
        assert_eq!(Value::from_json(&json!(1.5)), Value::F64(1.5));
    }

    #[test]
    fn booleans_and_huge_unsigned_fall_back_to_text() {
        assert_eq!(Value::from_json(&json!(false)), Value::Str("False".into()));
        assert_eq!(
            Value::from_json(&json!(u64::MAX)),
            Value::Str(u64::MAX.to_string())
        );
    }

    #[test]
    fn root_must_be_object() {
        let err = Dictionary::from_json_str("[1,2]").unwrap_err();
        assert!(matches!(err, JsonError::NotAnObject { found: "array" }));
        assert!(matches!(
            Dictionary::from_json_str("{"),
            Err(JsonError::Syntax(_))
        ));
    }

    #[test]
    fn nested_object_survives_to_json_and_back() {
        let doc = json!({"a": null, "b": [1, "x", {"c": 2.5}]});
        let v = Value::from_json(&doc);
        assert_eq!(v.to_json(), doc);
    }

    #[test]
    fn f32_to_json_uses_shortest_text() {
        assert_eq!(Value::F32(1.235).to_json(), json!(1.235));
    }
}
