//! PyScript Engine
//!
//! Runs short, untrusted Python-subset scripts at a search host's extension points
//! without letting them destabilise the host:
//!
//! - [`analyzer`] rejects structurally unsafe scripts (unconditional infinite loops,
//!   unreachable loops) before they consume any execution resource.
//! - [`ExecutionCoordinator`] runs validated scripts on a bounded [`WorkerPool`], each
//!   invocation in its own execution unit under a hot-settable time budget, and
//!   coerces results into [`ScriptValue`].
//! - [`contexts`] adapts field, score, template, ingest and search extension points.
//! - [`ScriptEngine`] is the host-facing entry point tying these together.
//!
//! # Example
//!
//! ```no_run
//! use pyscript_engine::contexts::ScoreContext;
//! use pyscript_engine::{EngineConfig, ScriptEngine};
//! use serde_json::Map;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ScriptEngine::new(EngineConfig::default())?;
//! let factory = engine.compile::<ScoreContext>("_score * 2")?;
//! let score = factory
//!     .new_instance(Map::new(), &Map::new())
//!     .execute(3.0, None)
//!     .await?;
//! assert_eq!(score, 6.0);
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod bindings;
pub mod config;
pub mod contexts;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod pool;
pub mod registry;
pub mod script;
pub mod units;
pub mod value;
pub mod warmup;

pub use analyzer::{Diagnostic, DiagnosticCode, DocFieldAccess, validate};
pub use bindings::{BindingName, BindingSet};
pub use config::{ConfigError, EngineConfig, UnitStrategy};
pub use contexts::{DocLookup, ScriptContext};
pub use coordinator::{Execution, ExecutionCoordinator, ExecutionLimits};
pub use engine::ScriptEngine;
pub use error::{PoolError, ScriptErrorKind, ScriptException, ScriptResult, WarmupError};
pub use pool::WorkerPool;
pub use registry::ContextRegistry;
pub use script::CompiledScript;
pub use units::{UnitProvider, UnitStatsSnapshot};
pub use value::ScriptValue;
pub use warmup::Readiness;
