use crate::duration::DurationValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

const FLOAT_EPSILON: f64 = 1e-9;

/// Declared type of a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int,
    Float,
    Bool,
    String,
    Duration,
    StringList,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::String => "string",
            ValueType::Duration => "duration",
            ValueType::StringList => "string_list",
        };
        f.write_str(name)
    }
}

/// Typed parameter value, stored on disk as `{"type": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Duration(DurationValue),
    StringList(Vec<String>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) => ValueType::String,
            Value::Duration(_) => ValueType::Duration,
            Value::StringList(_) => ValueType::StringList,
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Infer a typed value from a JSON scalar or array.
    ///
    /// Objects and nulls yield `None`; objects are flattened by the caller.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(i64::try_from(u).map_or(Value::Float(u as f64), Value::Int))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(items) => Some(Value::StringList(
                items.iter().map(json_scalar_text).collect(),
            )),
        }
    }

    /// Coerce this value to `target`, used when the wire carries a looser type
    /// than the knowledge base (SQL variables arrive as strings).
    pub fn coerce_to(&self, target: ValueType) -> Option<Value> {
        if self.value_type() == target {
            return Some(self.clone());
        }
        match (self, target) {
            (Value::String(s), ValueType::Bool) => parse_bool_word(s).map(Value::Bool),
            (Value::String(s), ValueType::Int) => s.trim().parse().ok().map(Value::Int),
            (Value::String(s), ValueType::Float) => s.trim().parse().ok().map(Value::Float),
            (Value::String(s), ValueType::Duration) => {
                DurationValue::parse(s).ok().map(Value::Duration)
            }
            (Value::String(s), ValueType::StringList) => Some(Value::StringList(split_list(s))),
            (Value::Int(i), ValueType::Float) => Some(Value::Float(*i as f64)),
            (Value::Float(f), ValueType::Int) if f.fract() == 0.0 => Some(Value::Int(*f as i64)),
            (Value::Int(i), ValueType::Bool) if *i == 0 || *i == 1 => Some(Value::Bool(*i == 1)),
            (Value::Bool(b), ValueType::String) => {
                Some(Value::String(if *b { "ON" } else { "OFF" }.to_string()))
            }
            (Value::Int(_) | Value::Float(_) | Value::Duration(_), ValueType::String) => {
                Some(Value::String(self.to_string()))
            }
            _ => None,
        }
    }

    /// Type-aware comparison.
    ///
    /// Durations compare by nanoseconds, floats within an epsilon, lists as
    /// sets unless `order_sensitive`. A string on one side is coerced to the
    /// other side's type before comparing.
    pub fn equals(&self, other: &Value, order_sensitive: bool) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_eq(*a, *b),
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                float_eq(*a as f64, *b)
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::StringList(a), Value::StringList(b)) => {
                if order_sensitive {
                    a == b
                } else {
                    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
                }
            }
            (Value::String(a), Value::String(b)) => {
                if a == b {
                    return true;
                }
                match (parse_bool_word(a), parse_bool_word(b)) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                }
            }
            (Value::String(_), typed) => self
                .coerce_to(typed.value_type())
                .is_some_and(|v| v.equals(typed, order_sensitive)),
            (typed, Value::String(_)) => other
                .coerce_to(typed.value_type())
                .is_some_and(|v| typed.equals(&v, order_sensitive)),
            (Value::Int(_), Value::Bool(_)) | (Value::Bool(_), Value::Int(_)) => {
                match (self.coerce_to(ValueType::Bool), other.coerce_to(ValueType::Bool)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => f.write_str(s),
            Value::Duration(d) => write!(f, "{d}"),
            Value::StringList(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

fn float_eq(a: f64, b: f64) -> bool {
    let diff = (a - b).abs();
    diff <= FLOAT_EPSILON || diff <= FLOAT_EPSILON * a.abs().max(b.abs())
}

fn json_scalar_text(json: &serde_json::Value) -> String {
    match json {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Boolean spellings accepted by TiDB system variables and TOML configs.
pub fn parse_bool_word(s: &str) -> Option<bool> {
    match s.trim().to_ascii_uppercase().as_str() {
        "ON" | "TRUE" | "1" => Some(true),
        "OFF" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn adjacently_tagged_layout() {
        let v = Value::Duration(DurationValue::from_secs(90));
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json, serde_json::json!({"type": "duration", "value": "1m30s"}));

        let list: Value =
            serde_json::from_value(serde_json::json!({"type": "string_list", "value": ["a", "b"]}))
                .unwrap();
        assert_eq!(list, Value::StringList(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn lists_compare_as_sets_by_default() {
        let a = Value::StringList(vec!["x".into(), "y".into()]);
        let b = Value::StringList(vec!["y".into(), "x".into()]);
        assert!(a.equals(&b, false));
        assert!(!a.equals(&b, true));
    }

    #[test]
    fn floats_use_epsilon() {
        assert!(Value::Float(0.8).equals(&Value::Float(0.1 * 8.0), false));
        assert!(!Value::Float(0.7).equals(&Value::Float(0.8), false));
        assert!(Value::Int(3).equals(&Value::Float(3.0), false));
    }

    #[test]
    fn sql_strings_coerce_to_typed_defaults() {
        assert!(Value::string("ON").equals(&Value::Bool(true), false));
        assert!(Value::Bool(false).equals(&Value::string("0"), false));
        assert!(Value::string("1024").equals(&Value::Int(1024), false));
        assert!(Value::string("1m30s").equals(&Value::Duration(DurationValue::from_secs(90)), false));
        assert!(Value::string("OFF").equals(&Value::string("false"), false));
        assert!(!Value::string("maybe").equals(&Value::Bool(true), false));
    }

    #[test]
    fn from_json_infers_types() {
        assert_eq!(Value::from_json(&serde_json::json!(7)), Some(Value::Int(7)));
        assert_eq!(Value::from_json(&serde_json::json!(0.5)), Some(Value::Float(0.5)));
        assert_eq!(Value::from_json(&serde_json::json!(true)), Some(Value::Bool(true)));
        assert_eq!(
            Value::from_json(&serde_json::json!(["a", 1])),
            Some(Value::StringList(vec!["a".into(), "1".into()]))
        );
        assert_eq!(Value::from_json(&serde_json::json!({"k": 1})), None);
        assert_eq!(Value::from_json(&serde_json::Value::Null), None);
    }
}
