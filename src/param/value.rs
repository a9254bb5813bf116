use serde::{Deserialize, Serialize};
use std::fmt;

/// The type tag a [`crate::param::Field`] is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "boolean",
            ValueType::Int => "integer",
            ValueType::Float => "float",
            ValueType::Str => "string",
        };
        f.write_str(name)
    }
}

/// A typed parameter value.
///
/// Serialized untagged so that snapshots and preset files read as plain JSON
/// (`true`, `20`, `0.5`, `"jtt"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used for range checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Convert a raw value into `target`, parsing text the way an entry box would.
    ///
    /// Returns `None` when the value cannot represent the target type.
    pub(crate) fn coerce(self, target: ValueType) -> Option<Value> {
        match (target, self) {
            (ValueType::Bool, Value::Bool(b)) => Some(Value::Bool(b)),
            (ValueType::Bool, Value::Str(s)) => parse_bool(&s).map(Value::Bool),
            (ValueType::Int, Value::Int(i)) => Some(Value::Int(i)),
            (ValueType::Int, Value::Str(s)) => s.trim().parse::<i64>().ok().map(Value::Int),
            (ValueType::Float, Value::Float(x)) => finite(x),
            (ValueType::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (ValueType::Float, Value::Str(s)) => s.trim().parse::<f64>().ok().and_then(finite),
            (ValueType::Str, Value::Str(s)) => Some(Value::Str(s)),
            _ => None,
        }
    }
}

fn finite(x: f64) -> Option<Value> {
    x.is_finite().then_some(Value::Float(x))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_parsed_per_target_type() {
        assert_eq!(Value::from("20").coerce(ValueType::Int), Some(Value::Int(20)));
        assert_eq!(Value::from(" yes ").coerce(ValueType::Bool), Some(Value::Bool(true)));
        assert_eq!(Value::from("0.25").coerce(ValueType::Float), Some(Value::Float(0.25)));
        assert_eq!(Value::from("abc").coerce(ValueType::Int), None);
    }

    #[test]
    fn ints_widen_to_float_but_not_back() {
        assert_eq!(Value::Int(3).coerce(ValueType::Float), Some(Value::Float(3.0)));
        assert_eq!(Value::Float(3.0).coerce(ValueType::Int), None);
        assert_eq!(Value::Int(1).coerce(ValueType::Bool), None);
        assert_eq!(Value::Int(1).coerce(ValueType::Str), None);
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert_eq!(Value::Float(f64::NAN).coerce(ValueType::Float), None);
        assert_eq!(Value::from("inf").coerce(ValueType::Float), None);
    }

    #[test]
    fn serializes_as_plain_json() {
        let json = serde_json::to_string(&vec![
            Value::Bool(true),
            Value::Int(20),
            Value::Str("jtt".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[true,20,"jtt"]"#);
        let back: Vec<Value> = serde_json::from_str("[false, 4, 0.5]").unwrap();
        assert_eq!(back, vec![Value::Bool(false), Value::Int(4), Value::Float(0.5)]);
    }
}
