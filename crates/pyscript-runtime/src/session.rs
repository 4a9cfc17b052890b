//! Isolated execution sessions
//!
//! A [`Session`] owns one global namespace plus its imported modules. Its
//! [`SessionControl`] is shared so another thread can interrupt or close the session
//! while an evaluation is running on the session's own thread.

use crate::error::{SessionError, SessionResult};
use crate::interpreter::Interpreter;
use crate::policy::CapabilityPolicy;
use crate::value::{Module, Value};
use pyscript_syntax::Program;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Cross-thread switches observed by a running evaluation
#[derive(Debug, Default)]
pub struct SessionControl {
    interrupted: AtomicBool,
    closed: AtomicBool,
}

impl SessionControl {
    /// Ask the running evaluation to stop at its next statement or loop iteration
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Mark the session unusable. Also stops a running evaluation.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }
}

pub struct Session {
    id: u64,
    globals: HashMap<String, Value>,
    modules: HashMap<String, Arc<Module>>,
    policy: Arc<CapabilityPolicy>,
    control: Arc<SessionControl>,
    evaluations: u64,
}

impl Session {
    pub fn new(policy: Arc<CapabilityPolicy>) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        trace!(session = id, "session created");
        Self {
            id,
            globals: HashMap::new(),
            modules: HashMap::new(),
            policy,
            control: Arc::new(SessionControl::default()),
            evaluations: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handle for interrupting or closing this session from another thread
    pub fn control(&self) -> Arc<SessionControl> {
        Arc::clone(&self.control)
    }

    pub fn policy(&self) -> &CapabilityPolicy {
        &self.policy
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Bind a global from a JSON value
    pub fn set_global_json(&mut self, name: impl Into<String>, json: &serde_json::Value) {
        self.set_global(name, Value::from_json(json));
    }

    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Evaluate a parsed program in this session's namespace.
    ///
    /// Returns the value of the final statement when it is an expression, otherwise
    /// `None`.
    pub fn eval(&mut self, program: &Program) -> SessionResult<Value> {
        if self.control.is_closed() {
            return Err(SessionError::Closed);
        }
        self.evaluations += 1;

        let mut interpreter = Interpreter::new(
            &mut self.globals,
            &mut self.modules,
            &self.policy,
            &self.control,
            self.id,
        );
        let result = interpreter.run(program);

        if let Err(err) = &result {
            debug!(session = self.id, error = %err, "evaluation failed");
        }
        Ok(result?)
    }

    /// Parse and evaluate source text
    pub fn eval_source(&mut self, source: &str) -> SessionResult<Value> {
        let program = pyscript_syntax::parse(source)?;
        self.eval(&program)
    }

    /// Drop all globals and clear a pending interrupt. Imported modules are kept.
    pub fn reset(&mut self) {
        self.globals.clear();
        self.control.clear_interrupt();
    }

    pub fn close(&self) {
        self.control.close();
    }

    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }

    /// Number of evaluations started on this session
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("globals", &self.globals.len())
            .field("evaluations", &self.evaluations)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExceptionKind;
    use serde_json::json;
    use std::thread;
    use std::time::Duration;

    fn session() -> Session {
        Session::new(Arc::new(CapabilityPolicy::default()))
    }

    fn runtime_kind(err: SessionError) -> ExceptionKind {
        match err {
            SessionError::Runtime(e) => e.kind,
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn test_trailing_expression_is_result() {
        let mut s = session();
        assert_eq!(s.eval_source("x = 2\nx * 21").unwrap(), Value::Int(42));
        assert_eq!(s.eval_source("y = 1").unwrap(), Value::None);
    }

    #[test]
    fn test_globals_persist_between_evaluations() {
        let mut s = session();
        s.eval_source("total = 10").unwrap();
        assert_eq!(s.eval_source("total + 5").unwrap(), Value::Int(15));
        assert_eq!(s.evaluations(), 2);
    }

    #[test]
    fn test_json_bindings() {
        let mut s = session();
        s.set_global_json("doc", &json!({"price": [10, 20], "name": "a"}));
        s.set_global_json("params", &json!({"factor": 1.5}));
        let v = s
            .eval_source("sum(doc['price']) * params['factor']")
            .unwrap();
        assert_eq!(v, Value::Float(45.0));
    }

    #[test]
    fn test_mutation_visible_through_binding() {
        let mut s = session();
        s.set_global_json("ctx", &json!({"n": 1}));
        s.eval_source("ctx['n'] += 1\nctx['tag'] = 'seen'").unwrap();
        let ctx = s.get_global("ctx").unwrap().to_json();
        assert_eq!(ctx, json!({"n": 2, "tag": "seen"}));
    }

    #[test]
    fn test_functions_and_defaults() {
        let mut s = session();
        let src = "def scale(x, by=2):\n    return x * by\nscale(3) + scale(1, by=10)";
        assert_eq!(s.eval_source(src).unwrap(), Value::Int(16));
    }

    #[test]
    fn test_recursion() {
        let mut s = session();
        let src = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\nfact(10)";
        assert_eq!(s.eval_source(src).unwrap(), Value::Int(3_628_800));
    }

    #[test]
    fn test_recursion_limit() {
        let policy = CapabilityPolicy {
            max_recursion_depth: 20,
            ..CapabilityPolicy::default()
        };
        let mut s = Session::new(Arc::new(policy));
        let err = s
            .eval_source("def f(n):\n    return f(n + 1)\nf(0)")
            .unwrap_err();
        assert_eq!(runtime_kind(err), ExceptionKind::RecursionError);
    }

    #[test]
    fn test_loops_break_continue() {
        let mut s = session();
        let src = "out = []\nfor i in range(10):\n    if i % 2 == 0:\n        continue\n    if i > 7:\n        break\n    out.append(i)\nout";
        assert_eq!(s.eval_source(src).unwrap().repr(), "[1, 3, 5, 7]");

        let src = "n = 0\nwhile n < 5:\n    n += 1\nn";
        assert_eq!(s.eval_source(src).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_unpacking() {
        let mut s = session();
        let src = "d = {'a': 1, 'b': 2}\nt = 0\nfor k, v in d.items():\n    t += v\na, b = 1, 2\na, b = b, a\n[t, a, b]";
        assert_eq!(s.eval_source(src).unwrap().repr(), "[3, 2, 1]");

        let err = s.eval_source("a, b = [1, 2, 3]").unwrap_err();
        assert_eq!(runtime_kind(err), ExceptionKind::ValueError);
    }

    #[test]
    fn test_boolean_operators_short_circuit() {
        let mut s = session();
        assert_eq!(s.eval_source("0 or 'x'").unwrap(), Value::from("x"));
        assert_eq!(s.eval_source("[] and undefined_name").unwrap().repr(), "[]");
        assert_eq!(s.eval_source("1 < 2 < 3").unwrap(), Value::Bool(true));
        assert_eq!(s.eval_source("'a' if 0 else 'b'").unwrap(), Value::from("b"));
    }

    #[test]
    fn test_raise_and_traceback() {
        let mut s = session();
        let src = "def check(v):\n    if v < 0:\n        raise ValueError('negative')\n    return v\ncheck(-1)";
        let err = s.eval_source(src).unwrap_err();
        let summary = err.stack_summary();
        assert_eq!(summary.last().unwrap(), "ValueError: negative");
        assert!(summary.iter().any(|l| l.contains("line 3, in check")));
        assert!(summary.iter().any(|l| l.contains("line 5, in <module>")));
    }

    #[test]
    fn test_name_and_type_errors() {
        let mut s = session();
        assert_eq!(
            runtime_kind(s.eval_source("missing + 1").unwrap_err()),
            ExceptionKind::NameError
        );
        assert_eq!(
            runtime_kind(s.eval_source("1 + 'a'").unwrap_err()),
            ExceptionKind::TypeError
        );
        assert_eq!(
            runtime_kind(s.eval_source("def f(a):\n    return a\nf()").unwrap_err()),
            ExceptionKind::TypeError
        );
    }

    #[test]
    fn test_import_policy() {
        let mut s = session();
        assert_eq!(
            s.eval_source("import math\nmath.floor(2.7)").unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            s.eval_source("import json as j\nj.loads('[1, 2]')").unwrap().repr(),
            "[1, 2]"
        );

        let mut locked = Session::new(Arc::new(CapabilityPolicy::locked_down()));
        let err = locked.eval_source("import math").unwrap_err();
        assert_eq!(runtime_kind(err), ExceptionKind::ImportError);

        let err = s.eval_source("import os").unwrap_err();
        assert_eq!(runtime_kind(err), ExceptionKind::ImportError);
    }

    #[test]
    fn test_delete() {
        let mut s = session();
        s.eval_source("x = 1\nd = {'a': 1}\ndel d['a']\ndel x").unwrap();
        assert!(s.get_global("x").is_none());
        assert_eq!(s.get_global("d").unwrap().repr(), "{}");
    }

    #[test]
    fn test_syntax_error_surfaces() {
        let mut s = session();
        let err = s.eval_source("x = (1 +").unwrap_err();
        assert!(matches!(err, SessionError::Syntax(_)));
        assert!(err.to_string().starts_with("Syntax error at line 1:"));
    }

    #[test]
    fn test_closed_session_refuses_work() {
        let mut s = session();
        s.close();
        assert!(matches!(s.eval_source("1"), Err(SessionError::Closed)));
    }

    #[test]
    fn test_interrupt_from_another_thread() {
        let mut s = session();
        let control = s.control();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            control.interrupt();
        });
        let err = s.eval_source("while True:\n    pass").unwrap_err();
        handle.join().unwrap();
        assert!(err.is_interrupted());

        s.reset();
        assert_eq!(s.eval_source("1 + 1").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_interrupt_stops_sleep() {
        let mut s = session();
        let control = s.control();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            control.interrupt();
        });
        let err = s.eval_source("import time\ntime.sleep(30)").unwrap_err();
        handle.join().unwrap();
        assert!(err.is_interrupted());
    }

    #[test]
    fn test_reset_clears_globals() {
        let mut s = session();
        s.eval_source("leftover = 1").unwrap();
        s.reset();
        assert!(s.get_global("leftover").is_none());
    }
}
