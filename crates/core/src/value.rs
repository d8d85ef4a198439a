//! The value tree produced by evaluation and consumed by emitters.

use indexmap::IndexMap;
use miette::Diagnostic;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;
use thiserror::Error;

/// A concrete scalar value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// UTF-8 string
    String(String),
    /// IEEE-754 number
    Number(f64),
    /// Boolean
    Bool(bool),
}

impl Scalar {
    /// Name of the scalar kind (`string`, `number` or `boolean`)
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
        }
    }

    /// Canonical text of a number, shared by the YAML emitter and template
    /// stringification.
    ///
    /// Integral values below 2^53 print without a fraction, others in
    /// shortest round-trip form (`2.5`, `1e21`). `None` for non-finite
    /// numbers, which have no canonical form.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn format_number(value: f64) -> Option<String> {
        if !value.is_finite() {
            return None;
        }
        if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
            return Some(format!("{}", value as i64));
        }
        Some(format!("{value:?}"))
    }
}

impl fmt::Display for Scalar {
    /// Declaration-syntax rendering: strings are quoted
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Number(n) => match Self::format_number(*n) {
                Some(text) => f.write_str(&text),
                None => write!(f, "{n}"),
            },
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A literal-constant value that remembers which declared constant produced it.
///
/// A sentinel serializes exactly like its literal; the provenance exists only
/// before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentinel {
    /// Name of the declared constant (e.g. `wait`)
    pub name: String,
    /// The literal the constant stands for
    pub literal: Scalar,
}

/// An evaluated configuration value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Plain scalar
    Scalar(Scalar),
    /// Scalar with sentinel provenance
    Sentinel(Sentinel),
    /// Ordered mapping, in insertion order
    Record(IndexMap<String, Value>),
    /// Ordered list
    Sequence(Vec<Value>),
}

impl Value {
    /// Shorthand for a string scalar
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(value.into()))
    }

    /// Shorthand for a number scalar
    #[must_use]
    pub const fn number(value: f64) -> Self {
        Self::Scalar(Scalar::Number(value))
    }

    /// Shorthand for a boolean scalar
    #[must_use]
    pub const fn bool(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }

    /// Build a record from `(key, value)` pairs, keeping their order
    #[must_use]
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The scalar this value renders as, for scalars and sentinels
    #[must_use]
    pub const fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Sentinel(s) => Some(&s.literal),
            Self::Record(_) | Self::Sequence(_) => None,
        }
    }

    /// Field lookup on records
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Record(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Whether this is a sentinel
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        matches!(self, Self::Sentinel(_))
    }
}

impl Serialize for Scalar {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => {
                let n = *n;
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                    if n >= 0.0 {
                        serializer.serialize_u64(n as u64)
                    } else {
                        serializer.serialize_i64(n as i64)
                    }
                } else {
                    serializer.serialize_f64(n)
                }
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(s) => s.serialize(serializer),
            Self::Sentinel(s) => s.literal.serialize(serializer),
            Self::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// A value that has no representation in the output document
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("value at `{path}` cannot be serialized: {reason}")]
#[diagnostic(
    code(pipetype::value::unserializable),
    help("Only strings, finite numbers, booleans, objects and arrays can be emitted")
)]
pub struct UnserializableValueError {
    /// Path of the offending value, e.g. `steps[2].parallelism`
    pub path: String,
    /// What the value was
    pub reason: String,
}

impl UnserializableValueError {
    /// Create an error for the value at `path`
    #[must_use]
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(Scalar::format_number(3.0).as_deref(), Some("3"));
        assert_eq!(Scalar::format_number(-2.0).as_deref(), Some("-2"));
        assert_eq!(Scalar::format_number(1.5).as_deref(), Some("1.5"));
        assert_eq!(Scalar::format_number(-0.0).as_deref(), Some("0"));
        assert_eq!(Scalar::format_number(0.1).as_deref(), Some("0.1"));
        assert_eq!(Scalar::format_number(1e21).as_deref(), Some("1e21"));
        assert_eq!(Scalar::Number(1e21).to_string(), "1e21");
        assert_eq!(Scalar::format_number(f64::INFINITY), None);
        assert_eq!(Scalar::format_number(f64::NAN), None);
    }

    #[test]
    fn test_sentinel_serializes_as_literal() {
        let value = Value::Sequence(vec![
            Value::Sentinel(Sentinel {
                name: "wait".into(),
                literal: Scalar::from("wait"),
            }),
            Value::string("wait"),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"["wait","wait"]"#);
    }

    #[test]
    fn test_record_preserves_insertion_order() {
        let value = Value::record([
            ("label", Value::string("Tests")),
            ("command", Value::string("make test")),
            ("parallelism", Value::number(2.0)),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(
            json,
            r#"{"label":"Tests","command":"make test","parallelism":2}"#
        );
    }

    #[test]
    fn test_integral_numbers_match_yaml_integers() {
        let value = Value::number(3.0);
        let expected: serde_yaml::Value = serde_yaml::from_str("3").unwrap();
        assert_eq!(serde_yaml::to_value(&value).unwrap(), expected);
    }

    #[test]
    fn test_scalar_display_quotes_strings() {
        assert_eq!(Scalar::from("wait").to_string(), "\"wait\"");
        assert_eq!(Scalar::from(10.0).to_string(), "10");
        assert_eq!(Scalar::from(true).to_string(), "true");
    }
}
