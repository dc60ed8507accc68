//! `json_stringify` / `json_parse` natives (indices 31/32).
//!
//! `Value` has no canonical JSON mapping for every variant (channels,
//! structs, functions...), so conversion is deliberately partial: anything
//! without a sensible JSON shape stringifies via the same formatter `str`
//! uses, and parsing only ever produces the JSON-native subset of `Value`
//! (int/flt/bool/void/str/array/map).

use std::sync::{Arc, Mutex};

use opo_core::{MapKey, MapValue, TypeDesc, Value};
use serde_json::Value as Json;

use crate::format::format_value;

pub fn stringify(v: &Value) -> String {
    serde_json::to_string(&to_json(v)).expect("json serialization of a JSON value cannot fail")
}

fn to_json(v: &Value) -> Json {
    match v {
        Value::Int(n) => Json::from(*n),
        Value::Flt(n) => serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
        Value::Bool(b) => Json::Bool(*b),
        Value::Void => Json::Null,
        Value::Str(s) => Json::String(s.to_string()),
        Value::Array(arr, _) => {
            let items = arr.lock().unwrap();
            Json::Array(items.iter().map(to_json).collect())
        }
        Value::Map(m, _) => {
            let entries = &m.lock().unwrap().entries;
            let mut obj = serde_json::Map::new();
            for (k, v) in entries.iter() {
                obj.insert(format_value(&k.to_value()), to_json(v));
            }
            Json::Object(obj)
        }
        // Everything else (structs, functions, channels, errors, other
        // enums) has no JSON shape; fall back to its printed form.
        other => Json::String(format_value(other)),
    }
}

pub fn parse(text: &str) -> Result<Value, String> {
    let parsed: Json = serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {e}"))?;
    Ok(from_json(&parsed))
}

fn from_json(j: &Json) -> Value {
    match j {
        Json::Null => Value::Void,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Flt(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => Value::Str(Arc::from(s.as_str())),
        Json::Array(items) => {
            let values: Vec<Value> = items.iter().map(from_json).collect();
            Value::Array(Arc::new(Mutex::new(values)), TypeDesc::Any)
        }
        Json::Object(obj) => {
            let mut map = MapValue::default();
            for (k, v) in obj.iter() {
                map.entries.insert(MapKey::Str(k.clone()), from_json(v));
            }
            Value::Map(Arc::new(Mutex::new(map)), TypeDesc::Any)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_object() {
        let parsed = parse(r#"{"a": 1, "b": [1, 2, 3]}"#).unwrap();
        let back = stringify(&parsed);
        let reparsed = parse(&back).unwrap();
        assert_eq!(stringify(&reparsed), back);
    }

    #[test]
    fn int_stays_int_not_float() {
        let json = stringify(&Value::Int(5));
        assert_eq!(json, "5");
    }

    #[test]
    fn parse_rejects_invalid_json() {
        assert!(parse("{not json").is_err());
    }
}
