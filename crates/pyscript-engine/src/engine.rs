//! Host-facing script engine

use crate::analyzer::{self, Diagnostic};
use crate::bindings::BindingSet;
use crate::config::{ConfigError, EngineConfig};
use crate::contexts::{CompiledHandle, ScriptContext};
use crate::coordinator::{ExecutionCoordinator, ExecutionLimits};
use crate::error::{ScriptException, ScriptResult, WarmupError};
use crate::pool::WorkerPool;
use crate::registry::{AnyFactory, ContextRegistry};
use crate::script::CompiledScript;
use crate::units::provider_for;
use crate::warmup::{Readiness, Warmup};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const WARMUP_SCRIPT: &str = "1+1";

/// Compiles scripts for registered extension points and runs them through a shared
/// [`ExecutionCoordinator`].
///
/// # Example
///
/// ```no_run
/// use pyscript_engine::contexts::TemplateContext;
/// use pyscript_engine::{EngineConfig, ScriptEngine};
/// use serde_json::Map;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = ScriptEngine::new(EngineConfig::default())?;
/// let factory = engine.compile::<TemplateContext>("'hello ' + params['name']")?;
/// let mut params = Map::new();
/// params.insert("name".into(), "world".into());
/// assert_eq!(factory.new_instance(params).execute().await?, "hello world");
/// # Ok(())
/// # }
/// ```
pub struct ScriptEngine {
    config: EngineConfig,
    registry: ContextRegistry,
    coordinator: Arc<ExecutionCoordinator>,
    warmup: Arc<Warmup>,
    warmup_task: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptEngine {
    /// Language name the host registers the engine under
    pub const NAME: &'static str = "python";

    /// Build an engine with its own worker pool sized from `config`
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = Arc::new(
            WorkerPool::new(config.worker_pool.name.clone(), config.worker_pool.size)
                .with_stack_size(config.worker_pool.stack_size_kb * 1024),
        );
        Ok(Self::assemble(config, pool))
    }

    /// Build an engine on a pool owned by the host
    pub fn with_worker_pool(
        config: EngineConfig,
        pool: Arc<WorkerPool>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::assemble(config, pool))
    }

    fn assemble(config: EngineConfig, pool: Arc<WorkerPool>) -> Self {
        let units = provider_for(
            config.execution.unit_strategy,
            config.execution.pooled_capacity,
            Arc::new(config.policy.clone()),
        );
        let coordinator = Arc::new(ExecutionCoordinator::new(
            pool,
            units,
            ExecutionLimits::from_config(&config.execution),
        ));
        info!(
            pool = coordinator.pool().name(),
            pool_size = coordinator.pool().size(),
            strategy = ?config.execution.unit_strategy,
            timeout_ms = config.execution.timeout_ms,
            "python script engine created"
        );
        Self {
            config,
            registry: ContextRegistry::with_defaults(),
            coordinator,
            warmup: Arc::new(Warmup::new()),
            warmup_task: Mutex::new(None),
        }
    }

    /// Replace the extension point registry. Only meaningful before the first compile.
    pub fn with_registry(mut self, registry: ContextRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Compile `source` for the extension point `C`
    pub fn compile<C: ScriptContext>(&self, source: &str) -> ScriptResult<C::Factory> {
        let factory = self.compile_for(C::NAME, source)?;
        factory
            .downcast::<C::Factory>()
            .map(|factory| *factory)
            .map_err(|_| {
                warn!(context = C::NAME, "registered factory has an unexpected type");
                ScriptException::unsupported_context(C::NAME, source)
            })
    }

    /// Compile `source` for an extension point named at runtime
    pub fn compile_for(&self, context: &str, source: &str) -> ScriptResult<AnyFactory> {
        let Some(name) = self.registry.resolve(context) else {
            debug!(context, "no adapter registered for context");
            return Err(ScriptException::unsupported_context(context, source));
        };
        let script = Arc::new(CompiledScript::compile(
            source,
            name,
            self.config.analyzer.max_diagnostics,
        ));
        if !script.is_valid() {
            debug!(
                context = name,
                diagnostics = script.diagnostics().len(),
                "compiled script will be refused at execution"
            );
        }
        let handle = CompiledHandle::new(script, Arc::clone(&self.coordinator));
        self.registry
            .create(name, handle)
            .ok_or_else(|| ScriptException::unsupported_context(context, source))
    }

    /// Run the analyzer without compiling
    pub fn validate(&self, source: &str) -> Vec<Diagnostic> {
        analyzer::validate_with_limit(
            &format!("{source}\n"),
            self.config.analyzer.max_diagnostics,
        )
    }

    pub fn time_budget(&self) -> Duration {
        self.coordinator.time_budget()
    }

    /// Process-wide; applies to invocations started after the call
    pub fn set_time_budget(&self, budget: Duration) {
        info!(budget_ms = budget.as_millis() as u64, "script time budget changed");
        self.coordinator.set_time_budget(budget);
    }

    pub fn supported_contexts(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.coordinator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Schedule the startup warmup. Returns `false` if it was already started.
    ///
    /// Must be called from within a tokio runtime. Failures are logged and leave the
    /// engine usable.
    pub fn start_warmup(&self) -> bool {
        if !self.warmup.begin() {
            debug!("warmup already started");
            return false;
        }
        if !self.config.warmup.enabled {
            self.warmup.finish(Ok(()));
            return true;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(error = %err, "cannot schedule warmup outside an async runtime");
                self.warmup.finish(Err(err.to_string()));
                return true;
            }
        };

        let delay = self.config.warmup.delay();
        let max_diagnostics = self.config.analyzer.max_diagnostics;
        let coordinator = Arc::clone(&self.coordinator);
        let warmup = Arc::clone(&self.warmup);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let script = CompiledScript::compile(WARMUP_SCRIPT, "warmup", max_diagnostics);
            match coordinator.run(&script, BindingSet::new()).await {
                Ok(_) => {
                    info!("python script engine warmed up");
                    warmup.finish(Ok(()));
                }
                Err(err) => {
                    error!(error = %err, "python script engine warmup failed");
                    warmup.finish(Err(err.to_string()));
                }
            }
        });
        *self.warmup_task.lock() = Some(task);
        true
    }

    pub fn readiness(&self) -> Readiness {
        self.warmup.readiness()
    }

    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), WarmupError> {
        self.warmup.wait_ready(timeout).await
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        if let Some(task) = self.warmup_task.lock().take()
            && !task.is_finished()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::{FieldContext, ScoreContext};

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.worker_pool.size = 2;
        config.warmup.delay_ms = 0;
        config
    }

    #[test]
    fn test_engine_name_and_contexts() {
        let engine = ScriptEngine::new(config()).unwrap();
        assert_eq!(ScriptEngine::NAME, "python");
        assert_eq!(
            engine.supported_contexts(),
            vec!["field", "ingest", "score", "search", "template"]
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.execution.timeout_ms = 0;
        assert!(matches!(
            ScriptEngine::new(config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_unsupported_context() {
        let engine = ScriptEngine::new(config()).unwrap();
        let err = engine.compile_for("aggs", "1").err().unwrap();
        assert_eq!(
            err.message,
            "Python engine does not know how to handle script context [aggs]"
        );

        let engine = ScriptEngine::new(config())
            .unwrap()
            .with_registry(ContextRegistry::new());
        assert!(engine.compile::<FieldContext>("1").is_err());
    }

    #[test]
    fn test_validate_reports_diagnostics() {
        let engine = ScriptEngine::new(config()).unwrap();
        assert!(engine.validate("x = 1").is_empty());
        let diagnostics = engine.validate("while False:\n    pass");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "Unreachable code: while False loop will never execute"
        );
    }

    #[test]
    fn test_time_budget_knob() {
        let engine = ScriptEngine::new(config()).unwrap();
        assert_eq!(engine.time_budget(), Duration::from_secs(20));
        engine.set_time_budget(Duration::from_secs(3));
        assert_eq!(engine.time_budget(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_compile_score_factory() {
        let engine = ScriptEngine::new(config()).unwrap();
        let factory = engine.compile::<ScoreContext>("_score * 2").unwrap();
        assert!(factory.needs_score());
        assert!(factory.is_result_deterministic());
    }

    #[tokio::test]
    async fn test_warmup_runs_once() {
        let engine = ScriptEngine::new(config()).unwrap();
        assert_eq!(engine.readiness(), Readiness::NotStarted);
        assert!(engine.start_warmup());
        assert!(!engine.start_warmup());
        engine.wait_ready(Duration::from_secs(10)).await.unwrap();
        assert_eq!(engine.readiness(), Readiness::Ready);
    }

    #[tokio::test]
    async fn test_disabled_warmup_is_immediately_ready() {
        let mut config = config();
        config.warmup.enabled = false;
        let engine = ScriptEngine::new(config).unwrap();
        engine.start_warmup();
        assert_eq!(engine.readiness(), Readiness::Ready);
    }
}
