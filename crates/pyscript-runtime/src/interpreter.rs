//! Tree-walking evaluator
//!
//! An [`Interpreter`] borrows the state of one [`Session`](crate::Session) for the
//! duration of a single evaluation. Every statement and every loop iteration checks the
//! session's interrupt flag, which is how a timed-out evaluation is brought down.

use crate::builtins::{self, Args};
use crate::error::{ExceptionKind, RuntimeError, RuntimeResult};
use crate::modules;
use crate::ops;
use crate::policy::CapabilityPolicy;
use crate::session::SessionControl;
use crate::value::{DictKey, ExceptionValue, Function, MAX_SEQUENCE_LEN, Module, Value};
use indexmap::IndexMap;
use pyscript_syntax::{BinOp, BoolOp, Constant, Expr, ExprKind, Program, Stmt, StmtKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of executing a statement
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Frame {
    function: String,
    locals: HashMap<String, Value>,
    line: u32,
}

pub struct Interpreter<'a> {
    globals: &'a mut HashMap<String, Value>,
    modules: &'a mut HashMap<String, Arc<Module>>,
    policy: &'a CapabilityPolicy,
    control: &'a SessionControl,
    session_id: u64,
    frames: Vec<Frame>,
    module_line: u32,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        globals: &'a mut HashMap<String, Value>,
        modules: &'a mut HashMap<String, Arc<Module>>,
        policy: &'a CapabilityPolicy,
        control: &'a SessionControl,
        session_id: u64,
    ) -> Self {
        Self {
            globals,
            modules,
            policy,
            control,
            session_id,
            frames: Vec::new(),
            module_line: 0,
        }
    }

    pub fn policy(&self) -> &CapabilityPolicy {
        self.policy
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Fail with `Interrupted` once the session has been interrupted or closed
    pub fn check_interrupt(&self) -> RuntimeResult<()> {
        if self.control.is_interrupted() || self.control.is_closed() {
            return Err(RuntimeError::interrupted());
        }
        Ok(())
    }

    /// Execute a program, returning the value of a trailing expression statement
    pub fn run(&mut self, program: &Program) -> RuntimeResult<Value> {
        let mut last = Value::None;
        let count = program.body.len();

        for (i, stmt) in program.body.iter().enumerate() {
            let outcome = match &stmt.kind {
                StmtKind::Expr(expr) if i + 1 == count => {
                    self.check_interrupt()
                        .and_then(|_| {
                            self.module_line = stmt.location.line;
                            self.eval_expr(expr)
                        })
                        .map(|value| last = value)
                }
                _ => self.exec_stmt(stmt).map(|_| ()),
            };
            if let Err(mut err) = outcome {
                err.push_frame("<module>", self.module_line);
                return Err(err);
            }
        }

        Ok(last)
    }

    // ---- statements -------------------------------------------------------

    fn exec_body(&mut self, body: &[Stmt]) -> RuntimeResult<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> RuntimeResult<Flow> {
        self.check_interrupt()?;
        self.set_line(stmt.location.line);

        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval_expr(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval_expr(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval_expr(test)?.is_truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_body(branch);
            }
            StmtKind::While { test, body } => loop {
                self.check_interrupt()?;
                if !self.eval_expr(test)?.is_truthy() {
                    break;
                }
                match self.exec_body(body)? {
                    Flow::Break => break,
                    Flow::Normal | Flow::Continue => {}
                    flow @ Flow::Return(_) => return Ok(flow),
                }
            },
            StmtKind::For {
                targets,
                iter,
                body,
            } => {
                let iterable = self.eval_expr(iter)?;
                for item in iterable.iter()? {
                    self.check_interrupt()?;
                    self.bind_loop_targets(targets, item)?;
                    match self.exec_body(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Raise(value) => return Err(self.raise(value.as_ref())?),
            StmtKind::FunctionDef(def) => {
                let defaults = def
                    .params
                    .iter()
                    .map(|param| param.default.as_ref().map(|d| self.eval_expr(d)).transpose())
                    .collect::<RuntimeResult<Vec<_>>>()?;
                let function = Function {
                    def: Arc::clone(def),
                    defaults,
                };
                self.store_name(&def.name, Value::Function(Arc::new(function)));
            }
            StmtKind::Import { module, alias } => {
                let loaded = self.import(module)?;
                self.store_name(alias.as_deref().unwrap_or(module), Value::Module(loaded));
            }
            StmtKind::Delete(target) => self.delete(target)?,
        }

        Ok(Flow::Normal)
    }

    fn set_line(&mut self, line: u32) {
        match self.frames.last_mut() {
            Some(frame) => frame.line = line,
            None => self.module_line = line,
        }
    }

    fn bind_loop_targets(&mut self, targets: &[String], item: Value) -> RuntimeResult<()> {
        if let [name] = targets {
            self.store_name(name, item);
            return Ok(());
        }
        let values = unpack(item, targets.len())?;
        for (name, value) in targets.iter().zip(values) {
            self.store_name(name, value);
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, value: Value) -> RuntimeResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.store_name(name, value);
                Ok(())
            }
            ExprKind::Subscript {
                value: container,
                index,
            } => {
                let container = self.eval_expr(container)?;
                let index = self.eval_expr(index)?;
                ops::set_item(&container, &index, value)
            }
            ExprKind::List(targets) => {
                let values = unpack(value, targets.len())?;
                for (target, value) in targets.iter().zip(values) {
                    self.assign(target, value)?;
                }
                Ok(())
            }
            ExprKind::Attribute { value: object, attr } => {
                let object = self.eval_expr(object)?;
                Err(RuntimeError::new(
                    ExceptionKind::AttributeError,
                    format!(
                        "'{}' object attribute '{attr}' is read-only",
                        object.type_name()
                    ),
                ))
            }
            _ => Err(RuntimeError::type_error("cannot assign to expression")),
        }
    }

    fn aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr) -> RuntimeResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                let current = self.load_name(name)?;
                let rhs = self.eval_expr(value)?;
                let updated = combine(op, &current, &rhs)?;
                self.store_name(name, updated);
                Ok(())
            }
            ExprKind::Subscript {
                value: container,
                index,
            } => {
                let container = self.eval_expr(container)?;
                let index = self.eval_expr(index)?;
                let current = ops::get_item(&container, &index)?;
                let rhs = self.eval_expr(value)?;
                let updated = combine(op, &current, &rhs)?;
                ops::set_item(&container, &index, updated)
            }
            _ => Err(RuntimeError::type_error(
                "illegal expression for augmented assignment",
            )),
        }
    }

    fn delete(&mut self, target: &Expr) -> RuntimeResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                let removed = match self.frames.last_mut() {
                    Some(frame) => frame.locals.remove(name),
                    None => self.globals.remove(name),
                };
                removed
                    .map(|_| ())
                    .ok_or_else(|| RuntimeError::name_error(name))
            }
            ExprKind::Subscript { value, index } => {
                let container = self.eval_expr(value)?;
                let index = self.eval_expr(index)?;
                ops::del_item(&container, &index)
            }
            ExprKind::List(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
                Ok(())
            }
            _ => Err(RuntimeError::type_error("cannot delete expression")),
        }
    }

    fn raise(&mut self, value: Option<&Expr>) -> RuntimeResult<RuntimeError> {
        let Some(expr) = value else {
            return Ok(RuntimeError::new(
                ExceptionKind::RuntimeError,
                "No active exception to reraise",
            ));
        };
        Ok(match self.eval_expr(expr)? {
            Value::Exception(exception) => {
                RuntimeError::new(exception.kind, exception.message.clone())
            }
            Value::ExceptionType(kind) => RuntimeError::new(kind, ""),
            _ => RuntimeError::type_error("exceptions must derive from BaseException"),
        })
    }

    fn import(&mut self, module: &str) -> RuntimeResult<Arc<Module>> {
        if !self.policy.allows_module(module) {
            return Err(RuntimeError::new(
                ExceptionKind::ImportError,
                format!("import of module '{module}' is not allowed"),
            ));
        }
        if let Some(loaded) = self.modules.get(module) {
            return Ok(Arc::clone(loaded));
        }
        let loaded = modules::load(module).ok_or_else(|| {
            RuntimeError::new(
                ExceptionKind::ImportError,
                format!("No module named '{module}'"),
            )
        })?;
        self.modules.insert(module.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    // ---- names ------------------------------------------------------------

    fn load_name(&self, name: &str) -> RuntimeResult<Value> {
        if let Some(frame) = self.frames.last()
            && let Some(value) = frame.locals.get(name)
        {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        builtins::lookup(name).ok_or_else(|| RuntimeError::name_error(name))
    }

    fn store_name(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.locals.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    // ---- expressions ------------------------------------------------------

    fn eval_expr(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match &expr.kind {
            ExprKind::Constant(constant) => Ok(match constant {
                Constant::None => Value::None,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Int(i) => Value::Int(*i),
                Constant::Float(f) => Value::Float(*f),
                Constant::Str(s) => Value::from(s.as_str()),
            }),
            ExprKind::Name(name) => self.load_name(name),
            ExprKind::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval_expr(item))
                    .collect::<RuntimeResult<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            ExprKind::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = DictKey::from_value(&self.eval_expr(key)?)?;
                    let value = self.eval_expr(value)?;
                    map.insert(key, value);
                }
                Ok(Value::dict(map))
            }
            ExprKind::Subscript { value, index } => {
                let container = self.eval_expr(value)?;
                let index = self.eval_expr(index)?;
                ops::get_item(&container, &index)
            }
            ExprKind::Attribute { value, attr } => {
                let object = self.eval_expr(value)?;
                get_attr(&object, attr)
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                let func = self.eval_expr(func)?;
                let positional = args
                    .iter()
                    .map(|arg| self.eval_expr(arg))
                    .collect::<RuntimeResult<Vec<_>>>()?;
                let keywords = keywords
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), self.eval_expr(value)?)))
                    .collect::<RuntimeResult<Vec<_>>>()?;
                self.call_value(&func, Args::new(positional, keywords))
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval_expr(operand)?;
                ops::unary_op(*op, &operand)
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                ops::binary_op(*op, &left, &right)
            }
            ExprKind::Compare { left, ops: chain } => {
                let mut left = self.eval_expr(left)?;
                for (op, right) in chain {
                    let right = self.eval_expr(right)?;
                    if !ops::compare_op(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::BoolOp { op, values } => {
                let mut result = Value::None;
                for value in values {
                    result = self.eval_expr(value)?;
                    let done = match op {
                        BoolOp::And => !result.is_truthy(),
                        BoolOp::Or => result.is_truthy(),
                    };
                    if done {
                        break;
                    }
                }
                Ok(result)
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval_expr(test)?.is_truthy() {
                    self.eval_expr(body)
                } else {
                    self.eval_expr(orelse)
                }
            }
        }
    }

    /// Call any callable value
    pub fn call_value(&mut self, func: &Value, args: Args) -> RuntimeResult<Value> {
        match func {
            Value::Function(function) => self.call_function(function, args),
            Value::Native(native) => (native.func)(self, args),
            Value::Method(method) => builtins::call_method(self, method, args),
            Value::ExceptionType(kind) => {
                args.finish(kind.name())?;
                let message = args.get(0).map(Value::to_str).unwrap_or_default();
                Ok(Value::Exception(Arc::new(ExceptionValue {
                    kind: *kind,
                    message,
                })))
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, function: &Arc<Function>, args: Args) -> RuntimeResult<Value> {
        if self.frames.len() >= self.policy.max_recursion_depth {
            return Err(RuntimeError::new(
                ExceptionKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }

        let def = &function.def;
        let name = def.name.as_str();
        let params = &def.params;

        if args.positional.len() > params.len() {
            return Err(RuntimeError::type_error(format!(
                "{name}() takes {} positional argument(s) but {} were given",
                params.len(),
                args.positional.len()
            )));
        }

        let mut locals: HashMap<String, Value> = params
            .iter()
            .zip(args.positional)
            .map(|(param, value)| (param.name.clone(), value))
            .collect();

        for (keyword, value) in args.keywords {
            if !params.iter().any(|p| p.name == keyword) {
                return Err(RuntimeError::type_error(format!(
                    "{name}() got an unexpected keyword argument '{keyword}'"
                )));
            }
            if locals.contains_key(&keyword) {
                return Err(RuntimeError::type_error(format!(
                    "{name}() got multiple values for argument '{keyword}'"
                )));
            }
            locals.insert(keyword, value);
        }

        let mut missing = Vec::new();
        for (param, default) in params.iter().zip(&function.defaults) {
            if locals.contains_key(&param.name) {
                continue;
            }
            match default {
                Some(default) => {
                    locals.insert(param.name.clone(), default.clone());
                }
                None => missing.push(format!("'{}'", param.name)),
            }
        }
        if !missing.is_empty() {
            return Err(RuntimeError::type_error(format!(
                "{name}() missing {} required positional argument(s): {}",
                missing.len(),
                missing.join(", ")
            )));
        }

        self.frames.push(Frame {
            function: name.to_string(),
            locals,
            line: def.location.line,
        });
        let result = self.exec_body(&def.body);
        let frame = self.frames.pop();

        match result {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(_) => Ok(Value::None),
            Err(mut err) => {
                if let Some(frame) = frame {
                    err.push_frame(frame.function, frame.line);
                }
                Err(err)
            }
        }
    }
}

fn get_attr(object: &Value, attr: &str) -> RuntimeResult<Value> {
    match object {
        Value::Module(module) => module.attrs.get(attr).cloned().ok_or_else(|| {
            RuntimeError::new(
                ExceptionKind::AttributeError,
                format!("module '{}' has no attribute '{attr}'", module.name),
            )
        }),
        Value::Exception(exception) if attr == "message" => {
            Ok(Value::from(exception.message.as_str()))
        }
        other => builtins::bind_method(other, attr)
            .ok_or_else(|| RuntimeError::attribute_error(other.type_name(), attr)),
    }
}

/// `current op= rhs`, extending lists in place for `+=`
fn combine(op: BinOp, current: &Value, rhs: &Value) -> RuntimeResult<Value> {
    if op == BinOp::Add
        && let Some(updated) = ops::inplace_add(current, rhs)?
    {
        return Ok(updated);
    }
    ops::binary_op(op, current, rhs)
}

fn unpack(value: Value, expected: usize) -> RuntimeResult<Vec<Value>> {
    if let Value::Range(range) = &value
        && range.len() > MAX_SEQUENCE_LEN
    {
        return Err(RuntimeError::value_error(format!(
            "too many values to unpack (expected {expected})"
        )));
    }
    let values = value.to_vec()?;
    match values.len().cmp(&expected) {
        std::cmp::Ordering::Equal => Ok(values),
        std::cmp::Ordering::Less => Err(RuntimeError::value_error(format!(
            "not enough values to unpack (expected {expected}, got {})",
            values.len()
        ))),
        std::cmp::Ordering::Greater => Err(RuntimeError::value_error(format!(
            "too many values to unpack (expected {expected})"
        ))),
    }
}
