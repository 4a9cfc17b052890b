//! Importable built-in modules: `math`, `json`, `time`

use crate::builtins::{Args, NativeFunction};
use crate::error::{ExceptionKind, RuntimeError, RuntimeResult};
use crate::interpreter::Interpreter;
use crate::value::{Module, Value};
use indexmap::IndexMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Granularity at which `time.sleep` re-checks for interruption
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Build a fresh module object, or `None` if no such module exists
pub fn load(name: &str) -> Option<Arc<Module>> {
    let module = match name {
        "math" => math_module(),
        "json" => json_module(),
        "time" => time_module(),
        _ => return None,
    };
    Some(Arc::new(module))
}

fn module(name: &'static str, functions: &'static [NativeFunction]) -> Module {
    let attrs = functions
        .iter()
        .map(|f| (f.name, Value::Native(f)))
        .collect::<IndexMap<_, _>>();
    Module { name, attrs }
}

// ---- math ----------------------------------------------------------------------

static MATH_FUNCTIONS: [NativeFunction; 17] = [
    NativeFunction { name: "sqrt", func: math_sqrt },
    NativeFunction { name: "floor", func: math_floor },
    NativeFunction { name: "ceil", func: math_ceil },
    NativeFunction { name: "trunc", func: math_trunc },
    NativeFunction { name: "fabs", func: math_fabs },
    NativeFunction { name: "exp", func: math_exp },
    NativeFunction { name: "log", func: math_log },
    NativeFunction { name: "log10", func: math_log10 },
    NativeFunction { name: "log2", func: math_log2 },
    NativeFunction { name: "pow", func: math_pow },
    NativeFunction { name: "sin", func: math_sin },
    NativeFunction { name: "cos", func: math_cos },
    NativeFunction { name: "tan", func: math_tan },
    NativeFunction { name: "atan", func: math_atan },
    NativeFunction { name: "isnan", func: math_isnan },
    NativeFunction { name: "isinf", func: math_isinf },
    NativeFunction { name: "isfinite", func: math_isfinite },
];

fn math_module() -> Module {
    let mut module = module("math", &MATH_FUNCTIONS);
    module.attrs.insert("pi", Value::Float(std::f64::consts::PI));
    module.attrs.insert("e", Value::Float(std::f64::consts::E));
    module.attrs.insert("tau", Value::Float(std::f64::consts::TAU));
    module.attrs.insert("inf", Value::Float(f64::INFINITY));
    module.attrs.insert("nan", Value::Float(f64::NAN));
    module
}

fn real_arg(value: &Value) -> RuntimeResult<f64> {
    value.as_f64().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "must be real number, not {}",
            value.type_name()
        ))
    })
}

fn one_real(args: &Args, name: &str) -> RuntimeResult<f64> {
    args.finish(name)?;
    args.arity(name, 1, 1)?;
    real_arg(&args.positional[0])
}

fn domain_error() -> RuntimeError {
    RuntimeError::value_error("math domain error")
}

fn checked_float(value: f64) -> RuntimeResult<Value> {
    if value.is_infinite() {
        return Err(RuntimeError::new(
            ExceptionKind::OverflowError,
            "math range error",
        ));
    }
    Ok(Value::Float(value))
}

fn float_to_int_value(value: f64) -> RuntimeResult<Value> {
    if !value.is_finite() || value.abs() >= 9.2e18 {
        return Err(RuntimeError::new(
            ExceptionKind::OverflowError,
            "cannot convert float to integer",
        ));
    }
    Ok(Value::Int(value as i64))
}

fn math_sqrt(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    let x = one_real(&args, "sqrt")?;
    if x < 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.sqrt()))
}

fn math_floor(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    if let Some(Value::Int(i)) = args.get(0) {
        return Ok(Value::Int(*i));
    }
    float_to_int_value(one_real(&args, "floor")?.floor())
}

fn math_ceil(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    if let Some(Value::Int(i)) = args.get(0) {
        return Ok(Value::Int(*i));
    }
    float_to_int_value(one_real(&args, "ceil")?.ceil())
}

fn math_trunc(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    if let Some(Value::Int(i)) = args.get(0) {
        return Ok(Value::Int(*i));
    }
    float_to_int_value(one_real(&args, "trunc")?.trunc())
}

fn math_fabs(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    Ok(Value::Float(one_real(&args, "fabs")?.abs()))
}

fn math_exp(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    checked_float(one_real(&args, "exp")?.exp())
}

fn math_log(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    args.finish("log")?;
    args.arity("log", 1, 2)?;
    let x = real_arg(&args.positional[0])?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    match args.get(1) {
        Some(base) => {
            let base = real_arg(base)?;
            if base <= 0.0 || base == 1.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.ln() / base.ln()))
        }
        None => Ok(Value::Float(x.ln())),
    }
}

fn math_log10(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    let x = one_real(&args, "log10")?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.log10()))
}

fn math_log2(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    let x = one_real(&args, "log2")?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.log2()))
}

fn math_pow(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    args.finish("pow")?;
    args.arity("pow", 2, 2)?;
    let x = real_arg(&args.positional[0])?;
    let y = real_arg(&args.positional[1])?;
    if x == 0.0 && y < 0.0 {
        return Err(domain_error());
    }
    checked_float(x.powf(y))
}

fn math_sin(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    Ok(Value::Float(one_real(&args, "sin")?.sin()))
}

fn math_cos(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    Ok(Value::Float(one_real(&args, "cos")?.cos()))
}

fn math_tan(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    Ok(Value::Float(one_real(&args, "tan")?.tan()))
}

fn math_atan(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    Ok(Value::Float(one_real(&args, "atan")?.atan()))
}

fn math_isnan(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    Ok(Value::Bool(one_real(&args, "isnan")?.is_nan()))
}

fn math_isinf(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    Ok(Value::Bool(one_real(&args, "isinf")?.is_infinite()))
}

fn math_isfinite(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    Ok(Value::Bool(one_real(&args, "isfinite")?.is_finite()))
}

// ---- json ----------------------------------------------------------------------

static JSON_FUNCTIONS: [NativeFunction; 2] = [
    NativeFunction { name: "dumps", func: json_dumps },
    NativeFunction { name: "loads", func: json_loads },
];

fn json_module() -> Module {
    module("json", &JSON_FUNCTIONS)
}

fn json_dumps(_: &mut Interpreter<'_>, mut args: Args) -> RuntimeResult<Value> {
    let indent = args.take_keyword("indent").filter(|v| !v.is_none());
    args.finish("dumps")?;
    args.arity("dumps", 1, 1)?;
    let json = args.positional[0].to_json();
    let text = if indent.is_some() {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    }
    .map_err(|e| RuntimeError::type_error(e.to_string()))?;
    Ok(Value::from(text))
}

fn json_loads(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    args.finish("loads")?;
    args.arity("loads", 1, 1)?;
    let text = args.positional[0].as_str().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "the JSON object must be str, not {}",
            args.positional[0].type_name()
        ))
    })?;
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| RuntimeError::value_error(e.to_string()))?;
    Ok(Value::from_json(&json))
}

// ---- time ----------------------------------------------------------------------

static TIME_FUNCTIONS: [NativeFunction; 3] = [
    NativeFunction { name: "time", func: time_time },
    NativeFunction { name: "monotonic", func: time_monotonic },
    NativeFunction { name: "sleep", func: time_sleep },
];

fn time_module() -> Module {
    module("time", &TIME_FUNCTIONS)
}

fn time_time(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    args.finish("time")?;
    args.arity("time", 0, 0)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(Value::Float(now))
}

fn time_monotonic(_: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    args.finish("monotonic")?;
    args.arity("monotonic", 0, 0)?;
    let origin = ORIGIN.get_or_init(Instant::now);
    Ok(Value::Float(origin.elapsed().as_secs_f64()))
}

fn time_sleep(interp: &mut Interpreter<'_>, args: Args) -> RuntimeResult<Value> {
    let seconds = one_real(&args, "sleep")?;
    if seconds.is_nan() || seconds < 0.0 {
        return Err(RuntimeError::value_error("sleep length must be non-negative"));
    }
    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|_| RuntimeError::new(ExceptionKind::OverflowError, "sleep length is too large"))?;

    let deadline = Instant::now() + duration;
    loop {
        interp.check_interrupt()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(Value::None);
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_known_modules() {
        let math = load("math").unwrap();
        assert_eq!(math.name, "math");
        assert!(math.attrs.contains_key("sqrt"));
        assert!(math.attrs.contains_key("pi"));
        assert!(load("json").is_some());
        assert!(load("os").is_none());
    }
}
