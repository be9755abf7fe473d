// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Plain materialized document values.
//!
//! Both the editable document and the replicated tree can be read back as a
//! [`Value`]: an ordinary tree with no CRDT metadata. The two sides are
//! compared with deep equality after every remote batch (the mandatory
//! post-condition of the remote event translator), so `Value` is the
//! common currency of the consistency check, the snapshot watch channel,
//! and most tests.
//!
//! The variants mirror the three replicated container kinds plus scalars.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Scalar::Float(f) => Some(*f),
            Scalar::Int(n) => Some(*n as f64),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// A plain (non-replicated) document tree value.
///
/// `Map` keys are kept sorted so equality and debug output are
/// deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Key-value container.
    Map(BTreeMap<String, Value>),
    /// Ordered sequence container.
    List(Vec<Value>),
    /// Collaborative text read back as a plain string.
    Text(String),
    /// Scalar leaf.
    Scalar(Scalar),
}

impl Value {
    /// Empty map value.
    pub fn empty_map() -> Self {
        Value::Map(BTreeMap::new())
    }

    /// Empty list value.
    pub fn empty_list() -> Self {
        Value::List(Vec::new())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Scalar(Scalar::Str(s.into()))
    }

    pub fn int(n: i64) -> Self {
        Value::Scalar(Scalar::Int(n))
    }

    pub fn float(f: f64) -> Self {
        Value::Scalar(Scalar::Float(f))
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a key on a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Look up an index on a list value.
    pub fn index(&self, idx: usize) -> Option<&Value> {
        self.as_list().and_then(|l| l.get(idx))
    }

    /// Build a map value from key/value pairs.
    pub fn map_of(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_equality() {
        let a = Value::map_of([
            ("children", Value::List(vec![Value::text("hi")])),
            ("speaker", Value::str("s1")),
        ]);
        let b = Value::map_of([
            ("speaker", Value::str("s1")),
            ("children", Value::List(vec![Value::text("hi")])),
        ]);
        // Insertion order does not matter for maps
        assert_eq!(a, b);
    }

    #[test]
    fn test_inequality_on_nested_text() {
        let a = Value::List(vec![Value::text("hi")]);
        let b = Value::List(vec![Value::text("ho")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_text_and_str_are_distinct() {
        // Collaborative text and plain string scalars are different kinds
        assert_ne!(Value::text("x"), Value::str("x"));
    }

    #[test]
    fn test_accessors() {
        let v = Value::map_of([("children", Value::List(vec![Value::int(7)]))]);
        assert_eq!(
            v.get("children").and_then(|c| c.index(0)),
            Some(&Value::int(7))
        );
        assert!(v.get("missing").is_none());
        assert!(v.index(0).is_none());
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(Scalar::from("x"), Scalar::Str("x".to_string()));
        assert_eq!(Scalar::from(3i64).as_int(), Some(3));
        assert_eq!(Scalar::from(0.5f64).as_float(), Some(0.5));
        assert_eq!(Scalar::Int(2).as_float(), Some(2.0));
    }
}
