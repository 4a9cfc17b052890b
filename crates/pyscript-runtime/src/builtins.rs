//! Built-in functions, exception classes and methods of `str`, `list` and `dict`

use crate::console;
use crate::error::{ExceptionKind, RuntimeError, RuntimeResult};
use crate::interpreter::Interpreter;
use crate::ops;
use crate::value::{BoundMethod, DictKey, MAX_SEQUENCE_LEN, Number, Range, Value, format_float};
use std::cmp::Ordering;
use std::sync::Arc;

/// Signature shared by every native callable
pub type NativeFn = fn(&mut Interpreter<'_>, Args) -> RuntimeResult<Value>;

/// A function implemented in Rust and exposed to scripts
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
}

/// Call arguments after evaluation
#[derive(Debug, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    pub fn positional(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    /// Remove and return a keyword argument
    pub fn take_keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(index).1)
    }

    /// Fail on any keyword argument that was not consumed
    pub fn finish(&self, func: &str) -> RuntimeResult<()> {
        match self.keywords.first() {
            Some((name, _)) => Err(RuntimeError::type_error(format!(
                "{func}() got an unexpected keyword argument '{name}'"
            ))),
            None => Ok(()),
        }
    }

    pub fn arity(&self, func: &str, min: usize, max: usize) -> RuntimeResult<()> {
        let given = self.positional.len();
        if given >= min && given <= max {
            return Ok(());
        }
        let message = if min == max {
            format!("{func}() takes exactly {min} argument(s) ({given} given)")
        } else if given < min {
            format!("{func}() expected at least {min} argument(s), got {given}")
        } else {
            format!("{func}() expected at most {max} argument(s), got {given}")
        };
        Err(RuntimeError::type_error(message))
    }

    /// Positional argument `index`, or `None` when absent
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    fn exact(self, func: &str, count: usize) -> RuntimeResult<Vec<Value>> {
        self.finish(func)?;
        self.arity(func, count, count)?;
        Ok(self.positional)
    }
}

macro_rules! native {
    ($ident:ident, $name:literal, $func:path) => {
        pub static $ident: NativeFunction = NativeFunction {
            name: $name,
            func: $func,
        };
    };
}

native!(LEN, "len", builtin_len);
native!(STR, "str", builtin_str);
native!(INT, "int", builtin_int);
native!(FLOAT, "float", builtin_float);
native!(BOOL, "bool", builtin_bool);
native!(ABS, "abs", builtin_abs);
native!(MIN, "min", builtin_min);
native!(MAX, "max", builtin_max);
native!(SUM, "sum", builtin_sum);
native!(RANGE, "range", builtin_range);
native!(ROUND, "round", builtin_round);
native!(SORTED, "sorted", builtin_sorted);
native!(LIST, "list", builtin_list);
native!(PRINT, "print", builtin_print);

static BUILTINS: [&NativeFunction; 14] = [
    &LEN, &STR, &INT, &FLOAT, &BOOL, &ABS, &MIN, &MAX, &SUM, &RANGE, &ROUND, &SORTED, &LIST,
    &PRINT,
];

/// Resolve a builtin name
pub fn lookup(name: &str) -> Option<Value> {
    if let Some(func) = BUILTINS.iter().copied().find(|f| f.name == name) {
        return Some(Value::Native(func));
    }
    ExceptionKind::from_name(name)
        .filter(|kind| *kind != ExceptionKind::Interrupted)
        .map(Value::ExceptionType)
}

fn builtin_len(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    let [value] = <[Value; 1]>::try_from(args.exact("len", 1)?).map_err(|_| arity_bug())?;
    Ok(Value::Int(value.len()? as i64))
}

fn builtin_str(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    args.finish("str")?;
    args.arity("str", 0, 1)?;
    Ok(match args.get(0) {
        Some(value) => Value::from(value.to_str()),
        None => Value::from(""),
    })
}

fn builtin_int(_: &mut Interpreter<'_>, mut args: Args) -> RuntimeResult<Value> {
    let base = args.take_keyword("base");
    args.finish("int")?;
    args.arity("int", 0, 2)?;
    let base = match args.get(1).or(base.as_ref()) {
        Some(base) => Some(base.as_index()?),
        None => None,
    };
    let Some(value) = args.get(0) else {
        return Ok(Value::Int(0));
    };

    match (value, base) {
        (Value::Str(s), base) => parse_int(s, base.unwrap_or(10)),
        (_, Some(_)) => Err(RuntimeError::type_error(
            "int() can't convert non-string with explicit base",
        )),
        (Value::Bool(b), None) => Ok(Value::Int(*b as i64)),
        (Value::Int(i), None) => Ok(Value::Int(*i)),
        (Value::Float(f), None) => float_to_int(*f),
        (other, None) => Err(RuntimeError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_int(text: &str, base: i64) -> RuntimeResult<Value> {
    let invalid = || {
        RuntimeError::value_error(format!(
            "invalid literal for int() with base {base}: {}",
            Value::from(text).repr()
        ))
    };
    let radix = u32::try_from(base)
        .ok()
        .filter(|b| (2..=36).contains(b))
        .ok_or_else(|| RuntimeError::value_error("int() base must be >= 2 and <= 36"))?;

    let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    let digits = match radix {
        16 => digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits),
        8 => digits
            .strip_prefix("0o")
            .or_else(|| digits.strip_prefix("0O"))
            .unwrap_or(digits),
        2 => digits
            .strip_prefix("0b")
            .or_else(|| digits.strip_prefix("0B"))
            .unwrap_or(digits),
        _ => digits,
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(invalid());
    }
    let magnitude = i128::from_str_radix(digits, radix).map_err(|_| invalid())?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value)
        .map(Value::Int)
        .map_err(|_| RuntimeError::overflow())
}

fn float_to_int(f: f64) -> RuntimeResult<Value> {
    if f.is_nan() {
        return Err(RuntimeError::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(RuntimeError::new(
            ExceptionKind::OverflowError,
            "cannot convert float infinity to integer",
        ));
    }
    let truncated = f.trunc();
    if truncated < -9.223_372_036_854_775_808e18 || truncated >= 9.223_372_036_854_775_808e18 {
        return Err(RuntimeError::overflow());
    }
    Ok(Value::Int(truncated as i64))
}

fn builtin_float(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    args.finish("float")?;
    args.arity("float", 0, 1)?;
    let Some(value) = args.get(0) else {
        return Ok(Value::Float(0.0));
    };
    match value {
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| {
                RuntimeError::value_error(format!(
                    "could not convert string to float: {}",
                    value.repr()
                ))
            }),
        other => other.as_f64().map(Value::Float).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn builtin_bool(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    args.finish("bool")?;
    args.arity("bool", 0, 1)?;
    Ok(Value::Bool(args.get(0).is_some_and(Value::is_truthy)))
}

fn builtin_abs(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    let [value] = <[Value; 1]>::try_from(args.exact("abs", 1)?).map_err(|_| arity_bug())?;
    match value.as_number() {
        Some(Number::Int(i)) => i.checked_abs().map(Value::Int).ok_or_else(RuntimeError::overflow),
        Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
        None => Err(RuntimeError::type_error(format!(
            "bad operand type for abs(): '{}'",
            value.type_name()
        ))),
    }
}

fn builtin_min(interp: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    extremum(interp, args, "min", Ordering::Less)
}

fn builtin_max(interp: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    extremum(interp, args, "max", Ordering::Greater)
}

fn extremum(
    interp: &mut Interpreter<'_>,
    mut args: Args,
    name: &str,
    wanted: Ordering,
) -> RuntimeResult<Value> {
    let key = args.take_keyword("key").filter(|k| !k.is_none());
    let default = args.take_keyword("default");
    args.finish(name)?;
    args.arity(name, 1, usize::MAX)?;

    let candidates = if args.positional.len() == 1 {
        args.positional[0].to_vec()?
    } else {
        args.positional
    };

    let mut best: Option<(Value, Value)> = None;
    for candidate in candidates {
        let rank = match &key {
            Some(key) => interp.call_value(key, Args::positional(vec![candidate.clone()]))?,
            None => candidate.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_rank, _)) => rank.py_cmp(best_rank)? == wanted,
        };
        if replace {
            best = Some((rank, candidate));
        }
    }

    match (best, default) {
        (Some((_, value)), _) => Ok(value),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(RuntimeError::value_error(format!(
            "{name}() arg is an empty sequence"
        ))),
    }
}

fn builtin_sum(interp: &mut Interpreter<'_>, mut args: Args) -> RuntimeResult<Value> {
    let start = args.take_keyword("start");
    args.finish("sum")?;
    args.arity("sum", 1, 2)?;
    let mut total = args.get(1).cloned().or(start).unwrap_or(Value::Int(0));
    if matches!(total, Value::Str(_)) {
        return Err(RuntimeError::type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    for item in args.positional[0].iter()? {
        interp.check_interrupt()?;
        total = ops::binary_op(pyscript_syntax::BinOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn builtin_range(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    args.finish("range")?;
    args.arity("range", 1, 3)?;
    let bounds = args
        .positional
        .iter()
        .map(Value::as_index)
        .collect::<RuntimeResult<Vec<i64>>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(arity_bug()),
    };
    if step == 0 {
        return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
    }
    Ok(Value::Range(Range { start, stop, step }))
}

fn builtin_round(_: &mut Interpreter<'_>, mut args: Args) -> RuntimeResult<Value> {
    let ndigits_kw = args.take_keyword("ndigits");
    args.finish("round")?;
    args.arity("round", 1, 2)?;
    let ndigits = match args.get(1).or(ndigits_kw.as_ref()) {
        None | Some(Value::None) => None,
        Some(n) => Some(n.as_index()?),
    };

    match (args.positional[0].as_number(), ndigits) {
        (Some(Number::Int(i)), _) => Ok(Value::Int(i)),
        (Some(Number::Float(f)), None) => float_to_int(f.round_ties_even()),
        (Some(Number::Float(f)), Some(n)) => {
            let exponent = i32::try_from(n).unwrap_or(if n > 0 { i32::MAX } else { i32::MIN });
            let scale = 10f64.powi(exponent);
            let scaled = (f * scale).round_ties_even() / scale;
            Ok(Value::Float(if scaled.is_finite() { scaled } else { f }))
        }
        (None, _) => Err(RuntimeError::type_error(format!(
            "type {} doesn't define __round__ method",
            args.positional[0].type_name()
        ))),
    }
}

fn builtin_sorted(interp: &mut Interpreter<'_>, mut args: Args) -> RuntimeResult<Value> {
    let key = args.take_keyword("key").filter(|k| !k.is_none());
    let reverse = args.take_keyword("reverse").is_some_and(|r| r.is_truthy());
    args.finish("sorted")?;
    args.arity("sorted", 1, 1)?;
    let items = args.positional[0].to_vec()?;
    Ok(Value::list(sort_values(interp, items, key.as_ref(), reverse)?))
}

fn builtin_list(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    args.finish("list")?;
    args.arity("list", 0, 1)?;
    match args.get(0) {
        Some(iterable) => Ok(Value::list(iterable.to_vec()?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn builtin_print(interp: &mut Interpreter<'_>, mut args: Args) -> RuntimeResult<Value> {
    let sep = args.take_keyword("sep").filter(|v| !v.is_none());
    let end = args.take_keyword("end").filter(|v| !v.is_none());
    args.finish("print")?;

    if !interp.policy().allow_print {
        return Ok(Value::None);
    }
    let sep = sep.map(|v| v.to_str()).unwrap_or_else(|| " ".to_string());
    let mut line = args
        .positional
        .iter()
        .map(Value::to_str)
        .collect::<Vec<_>>()
        .join(&sep);
    if let Some(end) = end {
        line.push_str(&end.to_str());
    }
    console::print(interp.session_id(), line.trim_end_matches('\n'));
    Ok(Value::None)
}

/// Stable sort with fallible comparisons and an optional key function
fn sort_values(
    interp: &mut Interpreter<'_>,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> RuntimeResult<Vec<Value>> {
    let ranks = match key {
        Some(key) => items
            .iter()
            .map(|item| interp.call_value(key, Args::positional(vec![item.clone()])))
            .collect::<RuntimeResult<Vec<Value>>>()?,
        None => items.clone(),
    };

    let mut order: Vec<usize> = (0..items.len()).collect();
    let mut failure = None;
    order.sort_by(|a, b| match ranks[*a].py_cmp(&ranks[*b]) {
        Ok(ordering) if reverse => ordering.reverse(),
        Ok(ordering) => ordering,
        Err(err) => {
            failure.get_or_insert(err);
            Ordering::Equal
        }
    });
    if let Some(err) = failure {
        return Err(err);
    }
    Ok(order.into_iter().map(|i| items[i].clone()).collect())
}

fn arity_bug() -> RuntimeError {
    RuntimeError::new(ExceptionKind::RuntimeError, "argument count mismatch")
}

// ---- methods ---------------------------------------------------------------

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "lstrip",
    "rstrip",
    "split",
    "join",
    "replace",
    "startswith",
    "endswith",
    "find",
    "count",
    "isdigit",
    "format",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "reverse", "sort", "copy",
    "clear",
];

const DICT_METHODS: &[&str] = &[
    "get",
    "keys",
    "values",
    "items",
    "pop",
    "update",
    "setdefault",
    "copy",
    "clear",
];

/// `receiver.attr` for built-in types, if `attr` names a method
pub fn bind_method(receiver: &Value, attr: &str) -> Option<Value> {
    let table = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        _ => return None,
    };
    let name = table.iter().copied().find(|m| *m == attr)?;
    Some(Value::Method(Arc::new(BoundMethod {
        receiver: receiver.clone(),
        name,
    })))
}

pub fn call_method(
    interp: &mut Interpreter<'_>,
    method: &BoundMethod,
    args: Args,
) -> RuntimeResult<Value> {
    match &method.receiver {
        Value::Str(s) => str_method(s, method.name, args),
        Value::List(_) => list_method(interp, &method.receiver, method.name, args),
        Value::Dict(_) => dict_method(&method.receiver, method.name, args),
        other => Err(RuntimeError::attribute_error(other.type_name(), method.name)),
    }
}

fn str_arg<'a>(value: &'a Value, func: &str) -> RuntimeResult<&'a str> {
    value.as_str().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{func}() argument must be str, not {}",
            value.type_name()
        ))
    })
}

fn str_method(s: &str, name: &str, mut args: Args) -> RuntimeResult<Value> {
    if name == "format" {
        return format_string(s, &args);
    }
    let maxsplit = if name == "split" {
        args.take_keyword("maxsplit")
    } else {
        None
    };
    let sep_kw = if name == "split" {
        args.take_keyword("sep")
    } else {
        None
    };
    args.finish(name)?;

    match name {
        "upper" => {
            args.arity(name, 0, 0)?;
            Ok(Value::from(s.to_uppercase()))
        }
        "lower" => {
            args.arity(name, 0, 0)?;
            Ok(Value::from(s.to_lowercase()))
        }
        "strip" | "lstrip" | "rstrip" => {
            args.arity(name, 0, 1)?;
            let chars: Option<Vec<char>> = match args.get(0) {
                None | Some(Value::None) => None,
                Some(v) => Some(str_arg(v, name)?.chars().collect()),
            };
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            };
            Ok(Value::from(out))
        }
        "split" => {
            args.arity(name, 0, 2)?;
            let sep = args.get(0).cloned().or(sep_kw).filter(|v| !v.is_none());
            let maxsplit = match args.get(1).cloned().or(maxsplit) {
                Some(v) => v.as_index()?,
                None => -1,
            };
            let parts = split_str(s, sep.as_ref(), maxsplit)?;
            Ok(Value::list(parts.into_iter().map(Value::from).collect()))
        }
        "join" => {
            args.arity(name, 1, 1)?;
            let items = args.positional[0].to_vec()?;
            let mut pieces = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(piece) => pieces.push(piece.to_string()),
                    None => {
                        return Err(RuntimeError::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            item.type_name()
                        )));
                    }
                }
            }
            let joined = pieces.join(s);
            if joined.len() > MAX_SEQUENCE_LEN {
                return Err(RuntimeError::new(
                    ExceptionKind::MemoryError,
                    "joined string is too large",
                ));
            }
            Ok(Value::from(joined))
        }
        "replace" => {
            args.arity(name, 2, 3)?;
            let old = str_arg(&args.positional[0], name)?;
            let new = str_arg(&args.positional[1], name)?;
            let out = match args.get(2) {
                Some(count) => {
                    let count = count.as_index()?;
                    if count < 0 {
                        s.replace(old, new)
                    } else {
                        s.replacen(old, new, count as usize)
                    }
                }
                None => s.replace(old, new),
            };
            if out.len() > MAX_SEQUENCE_LEN {
                return Err(RuntimeError::new(
                    ExceptionKind::MemoryError,
                    "replaced string is too large",
                ));
            }
            Ok(Value::from(out))
        }
        "startswith" | "endswith" => {
            args.arity(name, 1, 1)?;
            let affix = str_arg(&args.positional[0], name)?;
            Ok(Value::Bool(if name == "startswith" {
                s.starts_with(affix)
            } else {
                s.ends_with(affix)
            }))
        }
        "find" => {
            args.arity(name, 1, 1)?;
            let needle = str_arg(&args.positional[0], name)?;
            Ok(Value::Int(match s.find(needle) {
                Some(byte) => s[..byte].chars().count() as i64,
                None => -1,
            }))
        }
        "count" => {
            args.arity(name, 1, 1)?;
            let needle = str_arg(&args.positional[0], name)?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(count as i64))
        }
        "isdigit" => {
            args.arity(name, 0, 0)?;
            Ok(Value::Bool(
                !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
            ))
        }
        other => Err(RuntimeError::attribute_error("str", other)),
    }
}

fn split_str(s: &str, sep: Option<&Value>, maxsplit: i64) -> RuntimeResult<Vec<String>> {
    match sep {
        Some(sep) => {
            let sep = str_arg(sep, "split")?;
            if sep.is_empty() {
                return Err(RuntimeError::value_error("empty separator"));
            }
            Ok(if maxsplit < 0 {
                s.split(sep).map(str::to_string).collect()
            } else {
                s.splitn(maxsplit as usize + 1, sep)
                    .map(str::to_string)
                    .collect()
            })
        }
        None => {
            if maxsplit < 0 {
                return Ok(s.split_whitespace().map(str::to_string).collect());
            }
            let mut parts = Vec::new();
            let mut rest = s.trim_start();
            while !rest.is_empty() {
                if parts.len() as i64 == maxsplit {
                    parts.push(rest.to_string());
                    break;
                }
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                parts.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            Ok(parts)
        }
    }
}

/// `str.format` with positional/keyword fields and a small format-spec subset
fn format_string(template: &str, args: &Args) -> RuntimeResult<Value> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(RuntimeError::value_error(
                    "Single '}' encountered in format string",
                ));
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return Err(RuntimeError::value_error(
                        "Single '{' encountered in format string",
                    ));
                }
                let (name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let value = if name.is_empty() {
                    let value = args.positional.get(auto_index).ok_or_else(|| {
                        RuntimeError::index_error(format!(
                            "Replacement index {auto_index} out of range for positional args tuple"
                        ))
                    })?;
                    auto_index += 1;
                    value
                } else if let Ok(index) = name.parse::<usize>() {
                    args.positional.get(index).ok_or_else(|| {
                        RuntimeError::index_error(format!(
                            "Replacement index {index} out of range for positional args tuple"
                        ))
                    })?
                } else {
                    args.keywords
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| RuntimeError::key_error(Value::from(name).repr()))?
                };
                out.push_str(&apply_format_spec(value, spec)?);
            }
            other => out.push(other),
        }
    }
    Ok(Value::from(out))
}

fn apply_format_spec(value: &Value, spec: &str) -> RuntimeResult<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    let mut rest = spec;
    let align = match rest.chars().next() {
        Some(c @ ('<' | '>' | '^')) => {
            rest = &rest[1..];
            Some(c)
        }
        _ => None,
    };
    let width_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let width: usize = rest[..width_len].parse().unwrap_or(0);
    rest = &rest[width_len..];
    let precision = match rest.strip_prefix('.') {
        Some(after) => {
            let len = after
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len());
            let precision = after[..len].parse::<usize>().ok();
            rest = &after[len..];
            precision
        }
        None => None,
    };

    let invalid = || {
        RuntimeError::value_error(format!(
            "Unknown format code '{spec}' for object of type '{}'",
            value.type_name()
        ))
    };
    let body = match (rest, value.as_number()) {
        ("f", Some(n)) => format!("{:.*}", precision.unwrap_or(6), n.to_f64()),
        ("%", Some(n)) => format!("{:.*}%", precision.unwrap_or(6), n.to_f64() * 100.0),
        ("d", Some(Number::Int(i))) => i.to_string(),
        ("", Some(Number::Float(f))) => match precision {
            Some(p) => format!("{f:.p$}"),
            None => format_float(f),
        },
        ("", _) | ("s", _) => {
            let text = value.to_str();
            match precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            }
        }
        _ => return Err(invalid()),
    };

    let len = body.chars().count();
    if len >= width {
        return Ok(body);
    }
    let padding = width - len;
    let numeric = value.as_number().is_some();
    Ok(match align.unwrap_or(if numeric { '>' } else { '<' }) {
        '>' => format!("{}{body}", " ".repeat(padding)),
        '^' => format!(
            "{}{body}{}",
            " ".repeat(padding / 2),
            " ".repeat(padding - padding / 2)
        ),
        _ => format!("{body}{}", " ".repeat(padding)),
    })
}

fn list_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    mut args: Args,
) -> RuntimeResult<Value> {
    let Value::List(items) = receiver else {
        return Err(RuntimeError::attribute_error(receiver.type_name(), name));
    };

    if name == "sort" {
        let key = args.take_keyword("key").filter(|k| !k.is_none());
        let reverse = args.take_keyword("reverse").is_some_and(|r| r.is_truthy());
        args.finish(name)?;
        args.arity(name, 0, 0)?;
        let snapshot = items.lock().clone();
        let sorted = sort_values(interp, snapshot, key.as_ref(), reverse)?;
        *items.lock() = sorted;
        return Ok(Value::None);
    }

    args.finish(name)?;
    match name {
        "append" => {
            args.arity(name, 1, 1)?;
            let mut items = items.lock();
            if items.len() >= MAX_SEQUENCE_LEN {
                return Err(RuntimeError::new(
                    ExceptionKind::MemoryError,
                    "list is too large",
                ));
            }
            items.push(args.positional[0].clone());
            Ok(Value::None)
        }
        "extend" => {
            args.arity(name, 1, 1)?;
            ops::inplace_add(receiver, &args.positional[0])?;
            Ok(Value::None)
        }
        "pop" => {
            args.arity(name, 0, 1)?;
            let mut items = items.lock();
            if items.is_empty() {
                return Err(RuntimeError::index_error("pop from empty list"));
            }
            let len = items.len() as i64;
            let index = match args.get(0) {
                Some(i) => i.as_index()?,
                None => -1,
            };
            let resolved = if index < 0 { index + len } else { index };
            if resolved < 0 || resolved >= len {
                return Err(RuntimeError::index_error("pop index out of range"));
            }
            Ok(items.remove(resolved as usize))
        }
        "insert" => {
            args.arity(name, 2, 2)?;
            let mut items = items.lock();
            let len = items.len() as i64;
            let index = args.positional[0].as_index()?;
            let resolved = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(resolved as usize, args.positional[1].clone());
            Ok(Value::None)
        }
        "remove" | "index" => {
            args.arity(name, 1, 1)?;
            let needle = &args.positional[0];
            let snapshot = items.lock().clone();
            let Some(position) = snapshot.iter().position(|item| item.py_eq(needle)) else {
                return Err(RuntimeError::value_error(if name == "remove" {
                    "list.remove(x): x not in list".to_string()
                } else {
                    format!("{} is not in list", needle.repr())
                }));
            };
            if name == "index" {
                return Ok(Value::Int(position as i64));
            }
            let mut items = items.lock();
            if position < items.len() {
                items.remove(position);
            }
            Ok(Value::None)
        }
        "count" => {
            args.arity(name, 1, 1)?;
            let snapshot = items.lock().clone();
            let count = snapshot
                .iter()
                .filter(|item| item.py_eq(&args.positional[0]))
                .count();
            Ok(Value::Int(count as i64))
        }
        "reverse" => {
            args.arity(name, 0, 0)?;
            items.lock().reverse();
            Ok(Value::None)
        }
        "copy" => {
            args.arity(name, 0, 0)?;
            Ok(Value::list(items.lock().clone()))
        }
        "clear" => {
            args.arity(name, 0, 0)?;
            items.lock().clear();
            Ok(Value::None)
        }
        other => Err(RuntimeError::attribute_error("list", other)),
    }
}

fn dict_method(receiver: &Value, name: &str, mut args: Args) -> RuntimeResult<Value> {
    let Value::Dict(entries) = receiver else {
        return Err(RuntimeError::attribute_error(receiver.type_name(), name));
    };

    if name == "update" {
        args.arity(name, 0, 1)?;
        let mut incoming: Vec<(DictKey, Value)> = match args.get(0) {
            Some(Value::Dict(other)) => other
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Some(other) => {
                return Err(RuntimeError::type_error(format!(
                    "'{}' object is not a mapping",
                    other.type_name()
                )));
            }
            None => Vec::new(),
        };
        for (key, value) in args.keywords.drain(..) {
            incoming.push((DictKey::from(key.as_str()), value));
        }
        entries.lock().extend(incoming);
        return Ok(Value::None);
    }

    args.finish(name)?;
    match name {
        "get" => {
            args.arity(name, 1, 2)?;
            let key = DictKey::from_value(&args.positional[0])?;
            let found = entries.lock().get(&key).cloned();
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            args.arity(name, 0, 0)?;
            let keys = entries.lock().keys().map(DictKey::to_value).collect();
            Ok(Value::list(keys))
        }
        "values" => {
            args.arity(name, 0, 0)?;
            let values = entries.lock().values().cloned().collect();
            Ok(Value::list(values))
        }
        "items" => {
            args.arity(name, 0, 0)?;
            let items = entries
                .lock()
                .iter()
                .map(|(k, v)| Value::list(vec![k.to_value(), v.clone()]))
                .collect();
            Ok(Value::list(items))
        }
        "pop" => {
            args.arity(name, 1, 2)?;
            let key = DictKey::from_value(&args.positional[0])?;
            let removed = entries.lock().shift_remove(&key);
            match (removed, args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(RuntimeError::key_error(args.positional[0].repr())),
            }
        }
        "setdefault" => {
            args.arity(name, 1, 2)?;
            let key = DictKey::from_value(&args.positional[0])?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            let mut entries = entries.lock();
            Ok(entries.entry(key).or_insert(default).clone())
        }
        "copy" => {
            args.arity(name, 0, 0)?;
            Ok(Value::dict(entries.lock().clone()))
        }
        "clear" => {
            args.arity(name, 0, 0)?;
            entries.lock().clear();
            Ok(Value::None)
        }
        other => Err(RuntimeError::attribute_error("dict", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(matches!(lookup("len"), Some(Value::Native(f)) if f.name == "len"));
        assert!(matches!(
            lookup("ValueError"),
            Some(Value::ExceptionType(ExceptionKind::ValueError))
        ));
        assert!(lookup("Interrupted").is_none());
        assert!(lookup("open").is_none());
    }

    #[test]
    fn test_parse_int() {
        assert!(parse_int(" 42 ", 10).unwrap().py_eq(&Value::Int(42)));
        assert!(parse_int("-0x1f", 16).unwrap().py_eq(&Value::Int(-31)));
        let err = parse_int("abc", 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: invalid literal for int() with base 10: 'abc'"
        );
    }

    #[test]
    fn test_split() {
        let parts = split_str("  a b   c ", None, -1).unwrap();
        assert_eq!(parts, vec!["a", "b", "c"]);
        let parts = split_str("a b c", None, 1).unwrap();
        assert_eq!(parts, vec!["a", "b c"]);
        let parts = split_str("a,b,,c", Some(&Value::from(",")), -1).unwrap();
        assert_eq!(parts, vec!["a", "b", "", "c"]);
    }

    #[test]
    fn test_format_string() {
        let args = Args::new(
            vec![Value::from("world"), Value::Float(3.14159)],
            vec![("n".to_string(), Value::Int(7))],
        );
        let out = format_string("hello {} {:.2f} {n:>3} {{x}}", &args).unwrap();
        assert_eq!(out.to_str(), "hello world 3.14   7 {x}");

        assert!(format_string("{", &args).is_err());
        assert!(format_string("{5}", &args).is_err());
    }

    #[test]
    fn test_bind_method() {
        assert!(bind_method(&Value::from("x"), "upper").is_some());
        assert!(bind_method(&Value::from("x"), "append").is_none());
        assert!(bind_method(&Value::Int(1), "real").is_none());
    }
}
