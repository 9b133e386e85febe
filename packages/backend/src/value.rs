//! The Value type - an opaque typed settings datum.
//!
//! A backend stores one [`Value`] per key. The core never interprets
//! payloads; the only operations it needs are *type-of* ([`Value::type_of`])
//! and *type-match* ([`ValueType::matches`]), which back the read-path
//! anti-corruption check. Encoding values for disk or wire is a concern of
//! concrete backends.

use std::collections::BTreeMap;

use bytes::Bytes;

/// A settings value.
///
/// # Design Notes
///
/// - Uses `BTreeMap` for deterministic ordering (important for comparison)
/// - `Bytes` for the binary leaf: cheap, reference-counted clones
/// - `i64` for integers (sufficient for settings payloads)
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit floating point.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Bytes),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Key-value map with string keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// The type descriptor of this value.
    pub fn type_of(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Array(_) => ValueType::Array,
            Value::Map(_) => ValueType::Map,
        }
    }

    /// Get the boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the float payload, if this is a `Double`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get the string payload, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the binary payload, if this is `Bytes`.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get the elements, if this is an `Array`.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get the entries, if this is a `Map`.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

/// A type descriptor for [`Value`].
///
/// Descriptors support equality and one level of subtyping: [`ValueType::Any`]
/// admits every concrete type. This is all the read path needs to suppress
/// wrong-typed values coming out of a misbehaving backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Matches any value.
    Any,
    Bool,
    Int,
    Double,
    String,
    Bytes,
    Array,
    Map,
}

impl ValueType {
    /// Check whether a value of type `actual` satisfies this expected type.
    ///
    /// ```rust
    /// use prefstore_backend::ValueType;
    ///
    /// assert!(ValueType::Int.matches(&ValueType::Int));
    /// assert!(ValueType::Any.matches(&ValueType::String));
    /// assert!(!ValueType::Int.matches(&ValueType::String));
    /// ```
    pub fn matches(&self, actual: &ValueType) -> bool {
        matches!(self, ValueType::Any) || self == actual
    }
}

// Conversion from common types

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_of_covers_every_variant() {
        assert_eq!(Value::Bool(true).type_of(), ValueType::Bool);
        assert_eq!(Value::Int(1).type_of(), ValueType::Int);
        assert_eq!(Value::Double(0.5).type_of(), ValueType::Double);
        assert_eq!(Value::from("s").type_of(), ValueType::String);
        assert_eq!(Value::Bytes(Bytes::new()).type_of(), ValueType::Bytes);
        assert_eq!(Value::Array(vec![]).type_of(), ValueType::Array);
        assert_eq!(Value::Map(BTreeMap::new()).type_of(), ValueType::Map);
    }

    #[test]
    fn any_matches_everything() {
        for actual in [
            ValueType::Bool,
            ValueType::Int,
            ValueType::Double,
            ValueType::String,
            ValueType::Bytes,
            ValueType::Array,
            ValueType::Map,
            ValueType::Any,
        ] {
            assert!(ValueType::Any.matches(&actual));
        }
    }

    #[test]
    fn concrete_types_match_only_themselves() {
        assert!(ValueType::Int.matches(&ValueType::Int));
        assert!(!ValueType::Int.matches(&ValueType::String));
        assert!(!ValueType::String.matches(&ValueType::Int));
        assert!(!ValueType::Bool.matches(&ValueType::Any));
    }

    #[test]
    fn typed_getters() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Double(2.5).as_double(), Some(2.5));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(
            Value::from(vec![1u8, 2]).as_bytes(),
            Some(&Bytes::from_static(&[1, 2]))
        );
    }

    #[test]
    fn getters_refuse_wrong_variant() {
        assert_eq!(Value::Int(7).as_bool(), None);
        assert_eq!(Value::from("hi").as_int(), None);
        assert_eq!(Value::Bool(true).as_str(), None);
        assert!(Value::Int(7).as_array().is_none());
        assert!(Value::Int(7).as_map().is_none());
    }

    #[test]
    fn from_bool() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(false), Value::Bool(false));
    }

    #[test]
    fn from_integers() {
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from(-3i32), Value::Int(-3));
    }

    #[test]
    fn from_str_and_string() {
        assert_eq!(Value::from("hello"), Value::String("hello".to_string()));
        assert_eq!(
            Value::from("hello".to_string()),
            Value::String("hello".to_string())
        );
    }

    #[test]
    fn from_vec_of_values() {
        let value = Value::from(vec![1i64, 2, 3]);
        match value {
            Value::Array(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0], Value::Int(1));
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn bytes_clone_is_shallow() {
        let payload = Bytes::from(vec![0u8; 1024]);
        let a = Value::Bytes(payload.clone());
        let b = a.clone();
        assert_eq!(a, b);
        // Both clones still alias the original buffer.
        assert_eq!(b.as_bytes().unwrap().as_ptr(), payload.as_ptr());
    }
}
