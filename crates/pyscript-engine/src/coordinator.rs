//! Execution coordinator
//!
//! Runs a validated script against one invocation's bindings on the worker pool,
//! inside its own execution unit, under a time budget. The budget is measured from
//! before submission, so time spent queueing for a worker counts against it.
//!
//! On timeout the caller is released immediately. The unit is interrupted and
//! closed, and a reaper task waits for the worker to come back.

use crate::bindings::{BindingName, BindingSet};
use crate::config::ExecutionConfig;
use crate::error::{ScriptException, ScriptResult};
use crate::pool::{TaskHandle, WorkerPool};
use crate::script::CompiledScript;
use crate::units::{UnitLease, UnitProvider};
use crate::value::ScriptValue;
use arc_swap::ArcSwap;
use pyscript_runtime::{SessionControl, SessionError, Value};
use pyscript_syntax::Program;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

/// Process-wide limits, swappable at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub time_budget: Duration,
    /// How long the reaper waits for an interrupted worker
    pub teardown_grace: Duration,
}

impl ExecutionLimits {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            time_budget: config.timeout(),
            teardown_grace: config.teardown_grace(),
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

/// Outcome of one successful evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub value: ScriptValue,
    /// Final state of the `ctx` binding, when one was supplied
    pub ctx: Option<Map<String, JsonValue>>,
}

type WorkerOutcome = Result<Execution, SessionError>;

pub struct ExecutionCoordinator {
    pool: Arc<WorkerPool>,
    units: Arc<dyn UnitProvider>,
    limits: ArcSwap<ExecutionLimits>,
}

impl ExecutionCoordinator {
    pub fn new(
        pool: Arc<WorkerPool>,
        units: Arc<dyn UnitProvider>,
        limits: ExecutionLimits,
    ) -> Self {
        Self {
            pool,
            units,
            limits: ArcSwap::from_pointee(limits),
        }
    }

    pub fn limits(&self) -> ExecutionLimits {
        **self.limits.load()
    }

    pub fn time_budget(&self) -> Duration {
        self.limits.load().time_budget
    }

    /// Change the budget for invocations started from now on
    pub fn set_time_budget(&self, budget: Duration) {
        self.limits.rcu(|current| ExecutionLimits {
            time_budget: budget,
            ..**current
        });
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn units(&self) -> &Arc<dyn UnitProvider> {
        &self.units
    }

    /// Evaluate `script` against `bindings`
    pub async fn run(
        &self,
        script: &CompiledScript,
        bindings: BindingSet,
    ) -> ScriptResult<Execution> {
        let limits = self.limits();
        let span = info_span!(
            "script",
            invocation = %Uuid::new_v4(),
            context = script.context(),
            budget_ms = limits.time_budget.as_millis() as u64,
        );
        self.run_with_limits(script, bindings, limits)
            .instrument(span)
            .await
            .map_err(|err| err.with_context(script.context()))
    }

    async fn run_with_limits(
        &self,
        script: &CompiledScript,
        bindings: BindingSet,
        limits: ExecutionLimits,
    ) -> ScriptResult<Execution> {
        let program = match script.program() {
            Some(program) if script.is_valid() => Arc::clone(program),
            _ => {
                debug!(
                    diagnostics = script.diagnostics().len(),
                    "refusing to run invalid script"
                );
                return Err(ScriptException::invalid_script(
                    script.source(),
                    script.diagnostics().to_vec(),
                ));
            }
        };

        let started = Instant::now();
        let deadline = started + limits.time_budget;

        let lease = UnitLease::acquire(Arc::clone(&self.units));
        let control = lease.control();
        let task = move || evaluate(lease, &program, bindings);

        let mut handle = match timeout_at(deadline, self.pool.submit(task)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => {
                return Err(ScriptException::execution_failed(
                    err,
                    Vec::new(),
                    script.source(),
                ));
            }
            Err(_) => {
                debug!(pool = self.pool.name(), "time budget spent waiting for a worker");
                return Err(ScriptException::timeout(limits.time_budget, script.source()));
            }
        };

        match timeout_at(deadline, handle.join()).await {
            Ok(Ok(Ok(execution))) => {
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "script completed"
                );
                Ok(execution)
            }
            Ok(Ok(Err(err))) => {
                debug!(error = %err, "script failed");
                let stack = err.stack_summary();
                Err(ScriptException::execution_failed(err, stack, script.source()))
            }
            Ok(Err(err)) => {
                warn!(error = %err, "worker task failed");
                Err(ScriptException::execution_failed(err, Vec::new(), script.source()))
            }
            Err(_) => {
                teardown(control, handle, limits.teardown_grace);
                Err(ScriptException::timeout(limits.time_budget, script.source()))
            }
        }
    }
}

/// Interrupt and close a timed-out unit, then reap its worker in the background
fn teardown(control: Arc<SessionControl>, mut handle: TaskHandle<WorkerOutcome>, grace: Duration) {
    warn!(grace_ms = grace.as_millis() as u64, "script timed out, tearing down execution unit");
    control.interrupt();
    control.close();

    let reaper = async move {
        match timeout(grace, handle.join()).await {
            Ok(_) => debug!("timed out worker returned"),
            Err(_) => warn!(
                grace_ms = grace.as_millis() as u64,
                "worker still running after teardown grace, its pool slot stays taken"
            ),
        }
    };
    tokio::spawn(reaper.in_current_span());
}

/// Runs on a worker thread
fn evaluate(mut lease: UnitLease, program: &Program, bindings: BindingSet) -> WorkerOutcome {
    let result = bind_and_eval(&mut lease, program, &bindings);
    if result.is_err() {
        lease.poison();
    }
    result
}

fn bind_and_eval(
    lease: &mut UnitLease,
    program: &Program,
    bindings: &BindingSet,
) -> WorkerOutcome {
    let session = lease.session()?;
    // The host structure is the dict bound here; rebinding the name inside the
    // script must not replace it.
    let mut ctx_handle = None;
    for (name, json) in bindings.iter() {
        let value = Value::from_json(json);
        if name == BindingName::Ctx {
            ctx_handle = Some(value.clone());
        }
        session.set_global(name.as_str(), value);
    }

    let value = session.eval(program)?;

    let ctx = match ctx_handle.as_ref().map(Value::to_json) {
        Some(JsonValue::Object(map)) => Some(map),
        _ => None,
    };

    Ok(Execution {
        value: ScriptValue::from_runtime(&value),
        ctx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptErrorKind;
    use crate::units::FreshUnits;
    use pyscript_runtime::CapabilityPolicy;

    fn coordinator(budget: Duration) -> ExecutionCoordinator {
        ExecutionCoordinator::new(
            Arc::new(WorkerPool::new("test", 2)),
            Arc::new(FreshUnits::new(Arc::new(CapabilityPolicy::default()))),
            ExecutionLimits {
                time_budget: budget,
                teardown_grace: Duration::from_millis(500),
            },
        )
    }

    fn compile(source: &str) -> CompiledScript {
        CompiledScript::compile(source, "test", 16)
    }

    #[tokio::test]
    async fn test_runs_simple_script() {
        let coordinator = coordinator(Duration::from_secs(5));
        let execution = coordinator
            .run(&compile("1 + 1"), BindingSet::new())
            .await
            .unwrap();
        assert_eq!(execution.value, ScriptValue::Number(2.0));
        assert!(execution.ctx.is_none());
    }

    #[tokio::test]
    async fn test_invalid_script_never_acquires_a_unit() {
        let coordinator = coordinator(Duration::from_secs(5));
        let err = coordinator
            .run(&compile("while True:\n    pass"), BindingSet::new())
            .await
            .unwrap_err();
        assert!(err.is_invalid_script());
        assert_eq!(err.context.as_deref(), Some("test"));
        assert_eq!(coordinator.units().stats().snapshot().acquired, 0);
    }

    #[tokio::test]
    async fn test_runtime_error_is_classified() {
        let coordinator = coordinator(Duration::from_secs(5));
        let err = coordinator
            .run(&compile("def f():\n    return 1 / 0\nf()"), BindingSet::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::ExecutionFailed);
        assert_eq!(
            err.message,
            "Script execution failed with error: ZeroDivisionError: division by zero"
        );
        assert!(err.stack.iter().any(|line| line.contains("in f")));

        let stats = coordinator.units().stats().snapshot();
        assert_eq!((stats.acquired, stats.discarded), (1, 1));
    }

    #[tokio::test]
    async fn test_recursion_up_to_the_limit() {
        let coordinator = coordinator(Duration::from_secs(10));
        let depth = CapabilityPolicy::default().max_recursion_depth;
        let src = "def f(n):\n    if n == 0:\n        return 0\n    return 1 + f(n - 1)\n";

        let execution = coordinator
            .run(&compile(&format!("{src}f({})", depth - 5)), BindingSet::new())
            .await
            .unwrap();
        assert_eq!(execution.value, ScriptValue::Number((depth - 5) as f64));

        let err = coordinator
            .run(&compile(&format!("{src}f({})", depth * 2)), BindingSet::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::ExecutionFailed);
        assert_eq!(
            err.message,
            "Script execution failed with error: RecursionError: maximum recursion depth exceeded"
        );
    }

    #[tokio::test]
    async fn test_rebinding_ctx_leaves_host_structure() {
        let coordinator = coordinator(Duration::from_secs(5));
        let mut host = Map::new();
        host.insert("a".into(), 1.into());

        let execution = coordinator
            .run(
                &compile("ctx['b'] = 2\nctx = {'replaced': True}\nctx['c'] = 3"),
                BindingSet::new().with_ctx(host),
            )
            .await
            .unwrap();
        let ctx = execution.ctx.unwrap();
        assert_eq!(ctx.get("a"), Some(&JsonValue::from(1)));
        assert_eq!(ctx.get("b"), Some(&JsonValue::from(2)));
        assert!(!ctx.contains_key("replaced"));
        assert!(!ctx.contains_key("c"));
    }

    #[tokio::test]
    async fn test_time_budget_is_hot_settable() {
        let coordinator = coordinator(Duration::from_secs(5));
        coordinator.set_time_budget(Duration::from_millis(150));
        assert_eq!(coordinator.time_budget(), Duration::from_millis(150));
        assert_eq!(coordinator.limits().teardown_grace, Duration::from_millis(500));

        let err = coordinator
            .run(&compile("n = 0\nwhile n >= 0:\n    n += 1"), BindingSet::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.message, "Script execution timed out after 0.15 seconds");
    }
}
