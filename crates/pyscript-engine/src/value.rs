//! Script results in the host's value model

use pyscript_runtime::Value;
use pyscript_runtime::value::format_float;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of result shapes that cross back into the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum ScriptValue {
    #[default]
    None,
    String(String),
    Number(f64),
    Boolean(bool),
}

impl ScriptValue {
    /// Coerce an interpreter value.
    ///
    /// Numbers become doubles and modules become `None`. Lists, dicts, functions
    /// and other shapes fall back to their `repr`.
    pub fn from_runtime(value: &Value) -> Self {
        match value {
            Value::None | Value::Module(_) => ScriptValue::None,
            Value::Str(s) => ScriptValue::String(s.to_string()),
            Value::Bool(b) => ScriptValue::Boolean(*b),
            Value::Int(i) => ScriptValue::Number(*i as f64),
            Value::Float(f) => ScriptValue::Number(*f),
            other => ScriptValue::String(other.repr()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ScriptValue::None)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Textual form; empty for `None`
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ScriptValue::None => serde_json::Value::Null,
            ScriptValue::String(s) => serde_json::Value::String(s.clone()),
            ScriptValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ScriptValue::Boolean(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::None => Ok(()),
            ScriptValue::String(s) => f.write_str(s),
            ScriptValue::Number(n) => f.write_str(&format_float(*n)),
            ScriptValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(ScriptValue::from_runtime(&Value::Int(2)), ScriptValue::Number(2.0));
        assert_eq!(
            ScriptValue::from_runtime(&Value::from("hi")),
            ScriptValue::String("hi".into())
        );
        assert_eq!(
            ScriptValue::from_runtime(&Value::Bool(true)),
            ScriptValue::Boolean(true)
        );
        assert_eq!(ScriptValue::from_runtime(&Value::None), ScriptValue::None);
    }

    #[test]
    fn test_module_becomes_none() {
        let math = pyscript_runtime::modules::load("math").unwrap();
        assert!(ScriptValue::from_runtime(&Value::Module(math)).is_none());
    }

    #[test]
    fn test_other_shapes_fall_back_to_repr() {
        let list = Value::list(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(
            ScriptValue::from_runtime(&list),
            ScriptValue::String("[1, 'a']".into())
        );
    }

    #[test]
    fn test_text_form() {
        assert_eq!(ScriptValue::None.to_text(), "");
        assert_eq!(ScriptValue::Number(6.0).to_text(), "6.0");
        assert_eq!(ScriptValue::Boolean(false).to_text(), "false");
        assert_eq!(ScriptValue::String("x".into()).to_json(), serde_json::json!("x"));
    }
}
