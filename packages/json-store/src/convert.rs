//! Conversions between settings values and JSON documents.
//!
//! A settings document is one flat JSON object: member names are settings
//! keys, member values are the JSON encoding of [`Value`]. Binary payloads
//! have no JSON representation, so they are written as a tagged object
//! `{"$bytes": "<base64>"}`; the tag name is reserved inside `Map` values.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use prefstore_backend::{is_key, Bytes, Value};

use crate::error::Error;

const BYTES_TAG: &str = "$bytes";

/// Encode a settings value as JSON.
///
/// Non-finite doubles have no JSON encoding and come out as `null`, which
/// [`value_from_json`] refuses; settings payloads are expected to be finite.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Double(d) => JsonValue::from(*d),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Bytes(bytes) => json!({ BYTES_TAG: BASE64.encode(bytes) }),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Map(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), value_to_json(value)))
                .collect(),
        ),
    }
}

/// Decode a settings value from JSON.
pub fn value_from_json(json: &JsonValue) -> Result<Value, Error> {
    match json {
        JsonValue::Null => Err(Error::Document {
            message: "null is not a settings value".to_string(),
        }),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::Number(number) => {
            if let Some(i) = number.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(d) = number.as_f64() {
                Ok(Value::Double(d))
            } else {
                Err(Error::Document {
                    message: format!("number {} fits neither i64 nor f64", number),
                })
            }
        }
        JsonValue::String(s) => Ok(Value::String(s.clone())),
        JsonValue::Array(items) => items
            .iter()
            .map(value_from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        JsonValue::Object(object) => {
            if let Some(encoded) = bytes_tag(object) {
                let decoded = BASE64.decode(encoded).map_err(|e| Error::Document {
                    message: format!("bad base64 in {} value: {}", BYTES_TAG, e),
                })?;
                return Ok(Value::Bytes(Bytes::from(decoded)));
            }

            let mut entries = BTreeMap::new();
            for (key, value) in object {
                entries.insert(key.clone(), value_from_json(value)?);
            }
            Ok(Value::Map(entries))
        }
    }
}

fn bytes_tag(object: &JsonMap<String, JsonValue>) -> Option<&str> {
    if object.len() != 1 {
        return None;
    }
    object.get(BYTES_TAG).and_then(JsonValue::as_str)
}

/// Encode a key table as a flat settings document.
pub fn table_to_json(table: &BTreeMap<String, Value>) -> JsonValue {
    JsonValue::Object(
        table
            .iter()
            .map(|(key, value)| (key.clone(), value_to_json(value)))
            .collect(),
    )
}

/// Decode a flat settings document into a key table.
///
/// The root must be a JSON object. Members whose name is not a valid key or
/// whose value does not decode are skipped with a diagnostic, so a
/// hand-edited document with one bad entry does not take the whole store
/// down.
pub fn table_from_json(json: &JsonValue) -> Result<BTreeMap<String, Value>, Error> {
    let object = json.as_object().ok_or_else(|| Error::Document {
        message: "settings document root is not an object".to_string(),
    })?;

    let mut table = BTreeMap::new();
    for (key, value) in object {
        if !is_key(key) {
            log::warn!("settings document: '{}' is not a valid key; skipped", key);
            continue;
        }
        match value_from_json(value) {
            Ok(value) => {
                table.insert(key.clone(), value);
            }
            Err(error) => {
                log::warn!("settings document: entry '{}' skipped: {}", key, error);
            }
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) {
        let json = value_to_json(&value);
        assert_eq!(value_from_json(&json).unwrap(), value);
    }

    #[test]
    fn scalars_round_trip() {
        round_trip(Value::Bool(true));
        round_trip(Value::Bool(false));
        round_trip(Value::Int(0));
        round_trip(Value::Int(i64::MIN));
        round_trip(Value::Double(2.5));
        round_trip(Value::String("héllo".to_string()));
    }

    #[test]
    fn bytes_round_trip_through_the_tag() {
        let value = Value::Bytes(Bytes::from_static(&[0x00, 0xFF, 0x7F]));
        let json = value_to_json(&value);
        assert_eq!(json, json!({ "$bytes": "AP9/" }));
        assert_eq!(value_from_json(&json).unwrap(), value);
    }

    #[test]
    fn containers_round_trip() {
        round_trip(Value::Array(vec![
            Value::Int(1),
            Value::String("two".to_string()),
            Value::Array(vec![Value::Bool(false)]),
        ]));

        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), Value::Int(1));
        entries.insert("b".to_string(), Value::Bytes(Bytes::from_static(b"x")));
        round_trip(Value::Map(entries));
    }

    #[test]
    fn map_with_extra_members_is_not_mistaken_for_bytes() {
        let json = json!({ "$bytes": "AP9/", "other": 1 });
        let value = value_from_json(&json).unwrap();
        assert!(matches!(value, Value::Map(_)));
    }

    #[test]
    fn null_is_refused() {
        assert!(value_from_json(&JsonValue::Null).is_err());
        assert!(value_from_json(&json!([1, null])).is_err());
    }

    #[test]
    fn bad_base64_is_refused() {
        let json = json!({ "$bytes": "not base64!!!" });
        assert!(value_from_json(&json).is_err());
    }

    #[test]
    fn huge_unsigned_numbers_degrade_to_double() {
        let json = json!(u64::MAX);
        assert_eq!(
            value_from_json(&json).unwrap(),
            Value::Double(u64::MAX as f64)
        );
    }

    #[test]
    fn table_round_trips() {
        let mut table = BTreeMap::new();
        table.insert("/app/mode".to_string(), Value::String("dark".to_string()));
        table.insert("/app/volume".to_string(), Value::Int(50));

        let json = table_to_json(&table);
        assert_eq!(table_from_json(&json).unwrap(), table);
    }

    #[test]
    fn table_root_must_be_an_object() {
        assert!(table_from_json(&json!([1, 2])).is_err());
        assert!(table_from_json(&json!("nope")).is_err());
    }

    #[test]
    fn bad_table_entries_are_skipped_not_fatal() {
        let json = json!({
            "/good": 1,
            "not-a-key": 2,
            "/bad-value": null,
        });

        let table = table_from_json(&json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("/good"), Some(&Value::Int(1)));
    }
}
