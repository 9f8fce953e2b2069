//! Conversion between `serde_json::Value` and `yrs::Any`.
//!
//! `yrs::Any` is the value type used for CRDT register leaves — scalars,
//! strings, and (via [`json_to_any`]/[`any_to_json`]) whole JSON trees when a
//! caller genuinely wants one. Document fields themselves are not written
//! this way: `doc.rs` walks a field's value and recurses into real nested
//! `yrs::MapRef`/`ArrayRef` sub-documents for objects/arrays, only bottoming
//! out at `json_to_any` for scalar leaves, so concurrent edits to different
//! keys of the same nested object merge instead of clobbering each other.

use serde_json::{Map, Number, Value};
use yrs::Any;

pub fn json_to_any(value: &Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(b) => Any::Bool(*b),
        Value::Number(n) => number_to_any(n),
        Value::String(s) => Any::String(s.as_str().into()),
        Value::Array(items) => {
            let converted: Vec<Any> = items.iter().map(json_to_any).collect();
            Any::Array(converted.into())
        }
        Value::Object(map) => {
            let converted: std::collections::HashMap<String, Any> = map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_any(v)))
                .collect();
            Any::Map(Box::new(converted))
        }
    }
}

fn number_to_any(n: &Number) -> Any {
    if let Some(i) = n.as_i64() {
        Any::BigInt(i)
    } else {
        Any::Number(n.as_f64().unwrap_or(0.0))
    }
}

pub fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(b) => Value::Bool(*b),
        Any::Number(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Any::BigInt(i) => Value::Number(Number::from(*i)),
        Any::String(s) => Value::String(s.to_string()),
        Any::Buffer(bytes) => {
            Value::String(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes))
        }
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(map) => {
            let mut obj = Map::new();
            for (k, v) in map.iter() {
                obj.insert(k.clone(), any_to_json(v));
            }
            Value::Object(obj)
        }
    }
}
