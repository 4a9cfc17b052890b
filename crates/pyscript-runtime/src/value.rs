//! Interpreter value model
//!
//! Lists and dicts have reference semantics: cloning a [`Value`] clones the handle, so a
//! dict bound into a session and mutated by the script is visible to whoever kept the
//! other handle. Container locks are only ever held long enough to copy out a snapshot,
//! never across a nested operation, so self-referencing containers cannot deadlock.

use crate::builtins::NativeFunction;
use crate::error::{ExceptionKind, RuntimeError, RuntimeResult};
use indexmap::IndexMap;
use parking_lot::Mutex;
use pyscript_syntax::FunctionDef;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Largest list or string a script may build
pub const MAX_SEQUENCE_LEN: usize = 1_000_000;

const MAX_NESTED_DEPTH: usize = 64;

pub type ListRef = Arc<Mutex<Vec<Value>>>;
pub type DictRef = Arc<Mutex<IndexMap<DictKey, Value>>>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(ListRef),
    Dict(DictRef),
    Range(Range),
    Function(Arc<Function>),
    Native(&'static NativeFunction),
    Method(Arc<BoundMethod>),
    Module(Arc<Module>),
    ExceptionType(ExceptionKind),
    Exception(Arc<ExceptionValue>),
}

/// A user-defined function
pub struct Function {
    pub def: Arc<FunctionDef>,
    /// Evaluated default per parameter, `None` for required parameters
    pub defaults: Vec<Option<Value>>,
}

/// A built-in method bound to its receiver, e.g. `d.get`
pub struct BoundMethod {
    pub receiver: Value,
    pub name: &'static str,
}

/// An importable built-in module
pub struct Module {
    pub name: &'static str,
    pub attrs: IndexMap<&'static str, Value>,
}

/// An exception instance created by calling an exception class
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionValue {
    pub kind: ExceptionKind,
    pub message: String,
}

/// `range(start, stop, step)`; `step` is never zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let len = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / (-step) + 1
        } else {
            0
        };
        usize::try_from(len).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        let value = self.start as i128 + self.step as i128 * index as i128;
        i64::try_from(value).ok()
    }

    pub fn contains(&self, value: i64) -> bool {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let value = value as i128;
        let in_bounds = if step > 0 {
            start <= value && value < stop
        } else {
            stop < value && value <= start
        };
        in_bounds && (value - start) % step == 0
    }
}

/// Hashable projection of a value used as a dict key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    None,
    Bool(bool),
    Int(i64),
    /// Non-integral float, stored by bit pattern
    Float(u64),
    Str(Arc<str>),
}

impl DictKey {
    pub fn from_value(value: &Value) -> RuntimeResult<Self> {
        match value {
            Value::None => Ok(DictKey::None),
            Value::Bool(b) => Ok(DictKey::Bool(*b)),
            Value::Int(i) => Ok(DictKey::Int(*i)),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.2e18 {
                    Ok(DictKey::Int(*f as i64))
                } else {
                    Ok(DictKey::Float(f.to_bits()))
                }
            }
            Value::Str(s) => Ok(DictKey::Str(s.clone())),
            other => Err(RuntimeError::type_error(format!(
                "unhashable type: '{}'",
                other.type_name()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            DictKey::None => Value::None,
            DictKey::Bool(b) => Value::Bool(*b),
            DictKey::Int(i) => Value::Int(*i),
            DictKey::Float(bits) => Value::Float(f64::from_bits(*bits)),
            DictKey::Str(s) => Value::Str(s.clone()),
        }
    }

    /// Key text used when a dict leaves the interpreter as a JSON object
    pub fn to_json_key(&self) -> String {
        match self {
            DictKey::Str(s) => s.to_string(),
            other => other.to_value().to_str(),
        }
    }
}

impl From<&str> for DictKey {
    fn from(s: &str) -> Self {
        DictKey::Str(Arc::from(s))
    }
}

/// Numeric view of a value; `bool` counts as an integer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(Mutex::new(items)))
    }

    pub fn dict(entries: IndexMap<DictKey, Value>) -> Value {
        Value::Dict(Arc::new(Mutex::new(entries)))
    }

    pub fn empty_dict() -> Value {
        Value::dict(IndexMap::new())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Native(_) => "builtin_function_or_method",
            Value::Method(_) => "method",
            Value::Module(_) => "module",
            Value::ExceptionType(_) => "type",
            Value::Exception(e) => e.kind.name(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.lock().is_empty(),
            Value::Dict(entries) => !entries.lock().is_empty(),
            Value::Range(range) => !range.is_empty(),
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(*b as i64)),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Number::to_f64)
    }

    /// Integer view for indices and counts; floats are rejected as in Python
    pub fn as_index(&self) -> RuntimeResult<i64> {
        match self {
            Value::Bool(b) => Ok(*b as i64),
            Value::Int(i) => Ok(*i),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            ))),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Number of items, as returned by `len()`
    pub fn len(&self) -> RuntimeResult<usize> {
        match self {
            Value::Str(s) => Ok(s.chars().count()),
            Value::List(items) => Ok(items.lock().len()),
            Value::Dict(entries) => Ok(entries.lock().len()),
            Value::Range(range) => Ok(range.len()),
            other => Err(RuntimeError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))),
        }
    }

    /// Iterate a value the way a `for` loop does
    pub fn iter(&self) -> RuntimeResult<ValueIter> {
        let items: Vec<Value> = match self {
            Value::Str(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
            Value::List(items) => items.lock().clone(),
            Value::Dict(entries) => entries.lock().keys().map(DictKey::to_value).collect(),
            Value::Range(range) => {
                return Ok(ValueIter::Range {
                    next: range.start,
                    stop: range.stop,
                    step: range.step,
                });
            }
            other => {
                return Err(RuntimeError::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )));
            }
        };
        Ok(ValueIter::Items(items.into_iter()))
    }

    /// Collect an iterable into a vector, refusing oversized ranges
    pub fn to_vec(&self) -> RuntimeResult<Vec<Value>> {
        if let Value::Range(range) = self
            && range.len() > MAX_SEQUENCE_LEN
        {
            return Err(RuntimeError::new(
                ExceptionKind::MemoryError,
                "range is too large to materialise",
            ));
        }
        Ok(self.iter()?.collect())
    }

    /// `repr(value)`
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    /// `str(value)`
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(e) => e.message.clone(),
            other => other.repr(),
        }
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        if depth > MAX_NESTED_DEPTH {
            out.push_str("...");
            return;
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => write_str_repr(out, s),
            Value::List(items) => {
                let items = items.lock().clone();
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out, depth + 1);
                }
                out.push(']');
            }
            Value::Dict(entries) => {
                let entries: Vec<(DictKey, Value)> = entries
                    .lock()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.to_value().write_repr(out, depth + 1);
                    out.push_str(": ");
                    value.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Value::Range(r) => {
                if r.step == 1 {
                    out.push_str(&format!("range({}, {})", r.start, r.stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step));
                }
            }
            Value::Function(f) => out.push_str(&format!("<function {}>", f.def.name)),
            Value::Native(f) => out.push_str(&format!("<built-in function {}>", f.name)),
            Value::Method(m) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                m.name,
                m.receiver.type_name()
            )),
            Value::Module(m) => out.push_str(&format!("<module '{}'>", m.name)),
            Value::ExceptionType(kind) => out.push_str(&format!("<class '{kind}'>")),
            Value::Exception(e) => {
                out.push_str(e.kind.name());
                out.push('(');
                write_str_repr(out, &e.message);
                out.push(')');
            }
        }
    }

    /// `self == other`
    pub fn py_eq(&self, other: &Value) -> bool {
        self.eq_depth(other, 0)
    }

    fn eq_depth(&self, other: &Value, depth: usize) -> bool {
        if depth > MAX_NESTED_DEPTH {
            return false;
        }
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return match (a, b) {
                (Number::Int(a), Number::Int(b)) => a == b,
                (a, b) => a.to_f64() == b.to_f64(),
            };
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.lock().clone();
                let b = b.lock().clone();
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.eq_depth(y, depth + 1))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.lock().clone();
                let b = b.lock().clone();
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.get(key)
                            .is_some_and(|other| value.eq_depth(other, depth + 1))
                    })
            }
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => std::ptr::eq(*a, *b),
            (Value::Module(a), Value::Module(b)) => a.name == b.name,
            (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `self is other`
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => std::ptr::eq(*a, *b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Total order used by `sorted`, `min` and `max`; NaN compares equal
    pub fn py_cmp(&self, other: &Value) -> RuntimeResult<Ordering> {
        self.cmp_depth(other, 0)
    }

    fn cmp_depth(&self, other: &Value, depth: usize) -> RuntimeResult<Ordering> {
        if depth > MAX_NESTED_DEPTH {
            return Err(RuntimeError::new(
                ExceptionKind::RecursionError,
                "maximum recursion depth exceeded in comparison",
            ));
        }
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return Ok(match (a, b) {
                (Number::Int(a), Number::Int(b)) => a.cmp(&b),
                (a, b) => a
                    .to_f64()
                    .partial_cmp(&b.to_f64())
                    .unwrap_or(Ordering::Equal),
            });
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                let a = a.lock().clone();
                let b = b.lock().clone();
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.eq_depth(y, depth + 1) {
                        return x.cmp_depth(y, depth + 1);
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(RuntimeError::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// Convert a host JSON value into an interpreter value
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::dict(
                map.iter()
                    .map(|(k, v)| (DictKey::from(k.as_str()), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert an interpreter value back into host JSON.
    ///
    /// Values with no JSON shape (functions, modules, ...) become their `repr` string.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_depth(0)
    }

    fn to_json_depth(&self, depth: usize) -> serde_json::Value {
        use serde_json::Value as Json;

        if depth > MAX_NESTED_DEPTH {
            return Json::Null;
        }
        match self {
            Value::None => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.to_string()),
            Value::List(items) => {
                let items = items.lock().clone();
                Json::Array(items.iter().map(|v| v.to_json_depth(depth + 1)).collect())
            }
            Value::Dict(entries) => {
                let entries: Vec<(DictKey, Value)> = entries
                    .lock()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Json::Object(
                    entries
                        .iter()
                        .map(|(k, v)| (k.to_json_key(), v.to_json_depth(depth + 1)))
                        .collect(),
                )
            }
            Value::Range(range) => Json::Array(
                ValueIter::Range {
                    next: range.start,
                    stop: range.stop,
                    step: range.step,
                }
                .take(MAX_SEQUENCE_LEN)
                .map(|v| v.to_json_depth(depth + 1))
                .collect(),
            ),
            other => Json::String(other.repr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

/// Python `==`, so `1 == 1.0` holds
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.py_eq(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

/// Iterator produced by [`Value::iter`]
pub enum ValueIter {
    Items(std::vec::IntoIter<Value>),
    Range { next: i64, stop: i64, step: i64 },
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Items(items) => items.next(),
            ValueIter::Range { next, stop, step } => {
                let more = if *step > 0 { *next < *stop } else { *next > *stop };
                if !more {
                    return None;
                }
                let current = *next;
                *next = next.checked_add(*step).unwrap_or(*stop);
                Some(Value::Int(current))
            }
        }
    }
}

/// Format a float the way Python's `repr` does
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        // Rust renders 1e16 as "1e16"; Python wants "1e+16" and two exponent digits
        let formatted = format!("{f:e}");
        let Some((mantissa, exponent)) = formatted.split_once('e') else {
            return formatted;
        };
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return format!("{mantissa}e{sign}{digits:0>2}");
    }
    if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn write_str_repr(out: &mut String, s: &str) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_float_repr() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-3.5), "-3.5");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn test_str_and_repr() {
        let s = Value::from("it's");
        assert_eq!(s.to_str(), "it's");
        assert_eq!(s.repr(), "\"it's\"");

        let list = Value::list(vec![Value::Int(1), Value::from("a"), Value::None]);
        assert_eq!(list.repr(), "[1, 'a', None]");
        assert_eq!(list.to_str(), "[1, 'a', None]");
    }

    #[test]
    fn test_self_referencing_list_does_not_hang() {
        let list = Value::list(Vec::new());
        if let Value::List(items) = &list {
            items.lock().push(list.clone());
        }
        assert!(list.repr().contains("..."));
        assert!(list.py_eq(&list));
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert!(Value::Int(2).py_eq(&Value::Float(2.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::from("2").py_eq(&Value::Int(2)));
    }

    #[test]
    fn test_ordering() {
        assert_eq!(
            Value::Int(1).py_cmp(&Value::Float(1.5)).unwrap(),
            Ordering::Less
        );
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::list(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(a.py_cmp(&b).unwrap(), Ordering::Less);
        assert!(Value::from("a").py_cmp(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_shape() {
        let input = json!({"name": "x", "tags": [1, 2.5, true, null], "nested": {"a": 1}});
        let value = Value::from_json(&input);
        assert_eq!(value.to_json(), input);
    }

    #[test]
    fn test_non_json_values_become_strings() {
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
        let range = Value::Range(Range {
            start: 0,
            stop: 3,
            step: 1,
        });
        assert_eq!(range.to_json(), json!([0, 1, 2]));
    }

    #[test]
    fn test_range_len_and_contains() {
        let r = Range {
            start: 10,
            stop: 0,
            step: -3,
        };
        assert_eq!(r.len(), 4);
        assert!(r.contains(4));
        assert!(!r.contains(5));
        assert_eq!(r.get(3), Some(1));
    }

    #[test]
    fn test_dict_keys() {
        assert_eq!(
            DictKey::from_value(&Value::Float(3.0)).unwrap(),
            DictKey::Int(3)
        );
        assert!(DictKey::from_value(&Value::list(Vec::new())).is_err());
    }
}
