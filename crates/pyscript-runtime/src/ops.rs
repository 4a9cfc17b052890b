//! Operators and item access

use crate::error::{ExceptionKind, RuntimeError, RuntimeResult};
use crate::value::{DictKey, MAX_SEQUENCE_LEN, Number, Value};
use pyscript_syntax::{BinOp, CmpOp, UnaryOp};
use std::sync::Arc;

pub fn unary_op(op: UnaryOp, operand: &Value) -> RuntimeResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Pos => match operand.as_number() {
            Some(Number::Int(i)) => Ok(Value::Int(i)),
            Some(Number::Float(f)) => Ok(Value::Float(f)),
            None => Err(bad_unary("+", operand)),
        },
        UnaryOp::Neg => match operand.as_number() {
            Some(Number::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(RuntimeError::overflow),
            Some(Number::Float(f)) => Ok(Value::Float(-f)),
            None => Err(bad_unary("-", operand)),
        },
    }
}

fn bad_unary(symbol: &str, operand: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "bad operand type for unary {symbol}: '{}'",
        operand.type_name()
    ))
}

pub fn binary_op(op: BinOp, left: &Value, right: &Value) -> RuntimeResult<Value> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return numeric_op(op, a, b);
    }

    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            check_len(a.len() + b.len())?;
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::from(s))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.lock().clone();
            let extra = b.lock().clone();
            check_len(items.len() + extra.len())?;
            items.extend(extra);
            Ok(Value::list(items))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s))
            if matches!(n, Value::Int(_) | Value::Bool(_)) =>
        {
            let count = repeat_count(n)?;
            check_len(s.len().saturating_mul(count))?;
            Ok(Value::from(s.repeat(count)))
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if matches!(n, Value::Int(_) | Value::Bool(_)) =>
        {
            let count = repeat_count(n)?;
            let items = items.lock().clone();
            check_len(items.len().saturating_mul(count))?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        _ => Err(RuntimeError::type_error(format!(
            "unsupported operand type(s) for {op}: '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn repeat_count(n: &Value) -> RuntimeResult<usize> {
    let n = n.as_index()?;
    Ok(usize::try_from(n).unwrap_or(0))
}

fn check_len(len: usize) -> RuntimeResult<()> {
    if len > MAX_SEQUENCE_LEN {
        return Err(RuntimeError::new(
            ExceptionKind::MemoryError,
            format!("sequence of length {len} exceeds the limit of {MAX_SEQUENCE_LEN}"),
        ));
    }
    Ok(())
}

fn numeric_op(op: BinOp, a: Number, b: Number) -> RuntimeResult<Value> {
    if let (Number::Int(a), Number::Int(b)) = (a, b) {
        return int_op(op, a, b);
    }
    let (a, b) = (a.to_f64(), b.to_f64());
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(RuntimeError::zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(RuntimeError::zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(RuntimeError::zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(RuntimeError::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(value))
}

fn int_op(op: BinOp, a: i64, b: i64) -> RuntimeResult<Value> {
    let overflow = RuntimeError::overflow;
    match op {
        BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Div => {
            if b == 0 {
                return Err(RuntimeError::zero_division("division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(RuntimeError::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                Ok(Value::Int(q - 1))
            } else {
                Ok(Value::Int(q))
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            let r = a.checked_rem(b).unwrap_or(0);
            if r != 0 && ((r < 0) != (b < 0)) {
                Ok(Value::Int(r + b))
            } else {
                Ok(Value::Int(r))
            }
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(RuntimeError::zero_division(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).map(Value::Int).ok_or_else(overflow)
        }
    }
}

pub fn compare_op(op: CmpOp, left: &Value, right: &Value) -> RuntimeResult<bool> {
    match op {
        CmpOp::Eq => Ok(left.py_eq(right)),
        CmpOp::NotEq => Ok(!left.py_eq(right)),
        CmpOp::Is => Ok(left.is_same(right)),
        CmpOp::IsNot => Ok(!left.is_same(right)),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
            // Float comparisons go through f64 so NaN compares false both ways
            if let (Some(a), Some(b)) = (left.as_number(), right.as_number())
                && (matches!(a, Number::Float(_)) || matches!(b, Number::Float(_)))
            {
                let (a, b) = (a.to_f64(), b.to_f64());
                return Ok(match op {
                    CmpOp::Lt => a < b,
                    CmpOp::LtE => a <= b,
                    CmpOp::Gt => a > b,
                    _ => a >= b,
                });
            }
            let ordering = left.py_cmp(right).map_err(|_| {
                RuntimeError::type_error(format!(
                    "'{op}' not supported between instances of '{}' and '{}'",
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::LtE => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

/// `needle in container`
pub fn contains(container: &Value, needle: &Value) -> RuntimeResult<bool> {
    match container {
        Value::Str(haystack) => match needle {
            Value::Str(n) => Ok(haystack.contains(n.as_ref())),
            other => Err(RuntimeError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => {
            let items = items.lock().clone();
            Ok(items.iter().any(|item| item.py_eq(needle)))
        }
        Value::Dict(entries) => {
            let key = DictKey::from_value(needle)?;
            Ok(entries.lock().contains_key(&key))
        }
        Value::Range(range) => Ok(match needle.as_number() {
            Some(Number::Int(i)) => range.contains(i),
            Some(Number::Float(f)) if f.fract() == 0.0 => range.contains(f as i64),
            _ => false,
        }),
        other => Err(RuntimeError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Resolve a possibly negative sequence index
fn normalize_index(index: i64, len: usize, what: &str) -> RuntimeResult<usize> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    if resolved < 0 || resolved >= len {
        return Err(RuntimeError::index_error(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

/// `container[index]`
pub fn get_item(container: &Value, index: &Value) -> RuntimeResult<Value> {
    match container {
        Value::List(items) => {
            let items = items.lock();
            let i = normalize_index(index.as_index()?, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(index.as_index()?, chars.len(), "string")?;
            Ok(Value::from(chars[i].to_string()))
        }
        Value::Range(range) => {
            let i = normalize_index(index.as_index()?, range.len(), "range object")?;
            range
                .get(i)
                .map(Value::Int)
                .ok_or_else(|| RuntimeError::index_error("range object index out of range"))
        }
        Value::Dict(entries) => {
            let key = DictKey::from_value(index)?;
            entries
                .lock()
                .get(&key)
                .cloned()
                .ok_or_else(|| RuntimeError::key_error(index.repr()))
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `container[index] = value`
pub fn set_item(container: &Value, index: &Value, value: Value) -> RuntimeResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.lock();
            let i = normalize_index(index.as_index()?, items.len(), "list assignment")?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(entries) => {
            let key = DictKey::from_value(index)?;
            entries.lock().insert(key, value);
            Ok(())
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `del container[index]`
pub fn del_item(container: &Value, index: &Value) -> RuntimeResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.lock();
            let i = normalize_index(index.as_index()?, items.len(), "list assignment")?;
            items.remove(i);
            Ok(())
        }
        Value::Dict(entries) => {
            let key = DictKey::from_value(index)?;
            entries
                .lock()
                .shift_remove(&key)
                .map(|_| ())
                .ok_or_else(|| RuntimeError::key_error(index.repr()))
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

/// In-place `+=` on lists extends the existing list, as in Python
pub fn inplace_add(target: &Value, value: &Value) -> RuntimeResult<Option<Value>> {
    if let Value::List(items) = target {
        let extra = value.to_vec()?;
        let mut items_guard = items.lock();
        check_len(items_guard.len() + extra.len())?;
        items_guard.extend(extra);
        return Ok(Some(Value::List(Arc::clone(items))));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn test_floor_division_and_modulo_follow_python() {
        assert!(binary_op(BinOp::FloorDiv, &int(-7), &int(2)).unwrap().py_eq(&int(-4)));
        assert!(binary_op(BinOp::Mod, &int(-7), &int(2)).unwrap().py_eq(&int(1)));
        assert!(binary_op(BinOp::Mod, &int(7), &int(-2)).unwrap().py_eq(&int(-1)));
        assert!(
            binary_op(BinOp::Mod, &Value::Float(-7.5), &int(2))
                .unwrap()
                .py_eq(&Value::Float(0.5))
        );
    }

    #[test]
    fn test_true_division_is_float() {
        let result = binary_op(BinOp::Div, &int(6), &int(3)).unwrap();
        assert!(matches!(result, Value::Float(f) if f == 2.0));
    }

    #[test]
    fn test_zero_division() {
        let err = binary_op(BinOp::Div, &int(1), &int(0)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);
    }

    #[test]
    fn test_integer_overflow() {
        let err = binary_op(BinOp::Mul, &int(i64::MAX), &int(2)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::OverflowError);
        assert!(binary_op(BinOp::Pow, &int(2), &int(-1)).unwrap().py_eq(&Value::Float(0.5)));
    }

    #[test]
    fn test_sequence_ops() {
        let s = binary_op(BinOp::Add, &Value::from("hello "), &Value::from("world")).unwrap();
        assert_eq!(s.to_str(), "hello world");

        let repeated = binary_op(BinOp::Mul, &int(3), &Value::from("ab")).unwrap();
        assert_eq!(repeated.to_str(), "ababab");

        let err = binary_op(BinOp::Mul, &Value::from("x"), &int(10_000_000)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::MemoryError);

        let err = binary_op(BinOp::Add, &Value::from("x"), &int(1)).unwrap_err();
        assert!(err.message.contains("unsupported operand type(s) for +"));
    }

    #[test]
    fn test_comparisons() {
        assert!(compare_op(CmpOp::Lt, &int(1), &Value::Float(1.5)).unwrap());
        assert!(!compare_op(CmpOp::Lt, &Value::Float(f64::NAN), &int(1)).unwrap());
        assert!(compare_op(CmpOp::In, &Value::from("ell"), &Value::from("hello")).unwrap());
        assert!(compare_op(CmpOp::Is, &Value::None, &Value::None).unwrap());
        assert!(compare_op(CmpOp::Lt, &Value::from("a"), &int(1)).is_err());
    }

    #[test]
    fn test_item_access() {
        let list = Value::list(vec![int(1), int(2), int(3)]);
        assert!(get_item(&list, &int(-1)).unwrap().py_eq(&int(3)));
        assert_eq!(
            get_item(&list, &int(5)).unwrap_err().kind,
            ExceptionKind::IndexError
        );

        let dict = Value::empty_dict();
        set_item(&dict, &Value::from("tag"), Value::from("seen")).unwrap();
        assert_eq!(get_item(&dict, &Value::from("tag")).unwrap().to_str(), "seen");
        let err = get_item(&dict, &Value::from("missing")).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'missing'");

        del_item(&dict, &Value::from("tag")).unwrap();
        assert_eq!(dict.len().unwrap(), 0);
    }

    #[test]
    fn test_inplace_add_mutates_list() {
        let list = Value::list(vec![int(1)]);
        let alias = list.clone();
        inplace_add(&list, &Value::list(vec![int(2)])).unwrap();
        assert_eq!(alias.len().unwrap(), 2);
    }
}
