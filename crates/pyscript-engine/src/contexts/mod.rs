//! Script context adapters, one per extension point
//!
//! Every adapter turns the host's live context into a [`BindingSet`], runs the script
//! through the shared [`ExecutionCoordinator`] and shapes the result for its
//! extension point. Factories and instances are immutable and can serve any number
//! of concurrent invocations.

mod field;
mod ingest;
mod score;
mod search;
mod template;

pub use field::{FieldContext, FieldScript, FieldScriptFactory};
pub use ingest::{IngestContext, IngestScript, IngestScriptFactory};
pub use score::{ExplanationHolder, ScoreContext, ScoreScript, ScoreScriptFactory};
pub use search::{SearchContext, SearchScript, SearchScriptFactory};
pub use template::{TemplateContext, TemplateScript, TemplateScriptFactory};

use crate::analyzer::DocFieldAccess;
use crate::bindings::BindingSet;
use crate::coordinator::{Execution, ExecutionCoordinator};
use crate::error::ScriptResult;
use crate::script::CompiledScript;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// An extension point the engine can compile scripts for
pub trait ScriptContext: 'static {
    /// Name the host uses to request this context
    const NAME: &'static str;

    /// What `compile` hands back to the host
    type Factory: Send + Sync + 'static;

    fn new_factory(script: CompiledHandle) -> Self::Factory;
}

/// Host document capability: named field lookups
pub trait DocLookup {
    fn field(&self, name: &str) -> Option<JsonValue>;

    fn field_names(&self) -> Vec<String>;
}

impl DocLookup for Map<String, JsonValue> {
    fn field(&self, name: &str) -> Option<JsonValue> {
        self.get(name).cloned()
    }

    fn field_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

/// Copy the fields a script reads out of the host document
pub fn materialize_doc(doc: &dyn DocLookup, access: &DocFieldAccess) -> Map<String, JsonValue> {
    let names = match access {
        DocFieldAccess::Fields(fields) => fields.iter().cloned().collect(),
        DocFieldAccess::Dynamic => doc.field_names(),
    };
    names
        .into_iter()
        .filter_map(|name| doc.field(&name).map(|value| (name, value)))
        .collect()
}

/// A compiled script together with the coordinator that runs it
#[derive(Clone)]
pub struct CompiledHandle {
    script: Arc<CompiledScript>,
    coordinator: Arc<ExecutionCoordinator>,
}

impl CompiledHandle {
    pub fn new(script: Arc<CompiledScript>, coordinator: Arc<ExecutionCoordinator>) -> Self {
        Self {
            script,
            coordinator,
        }
    }

    pub fn script(&self) -> &CompiledScript {
        &self.script
    }

    pub async fn run(&self, bindings: BindingSet) -> ScriptResult<Execution> {
        self.coordinator.run(&self.script, bindings).await
    }
}

/// Shared body of the ingest and search adapters: the only effect is on `ctx`
async fn run_transform(
    handle: &CompiledHandle,
    params: &Map<String, JsonValue>,
    ctx: &mut Map<String, JsonValue>,
) -> ScriptResult<()> {
    let bindings = BindingSet::new()
        .with_params(params.clone())
        .with_ctx(ctx.clone());
    let execution = handle.run(bindings).await?;
    if let Some(updated) = execution.ctx {
        *ctx = updated;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn doc() -> Map<String, JsonValue> {
        match json!({"a": 1, "b": "x", "c": [1, 2]}) {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_materialize_only_accessed_fields() {
        let access = DocFieldAccess::Fields(BTreeSet::from(["a".to_string(), "zz".to_string()]));
        let materialized = materialize_doc(&doc(), &access);
        assert_eq!(materialized.len(), 1);
        assert_eq!(materialized.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_materialize_dynamic_copies_everything() {
        let materialized = materialize_doc(&doc(), &DocFieldAccess::Dynamic);
        assert_eq!(materialized.len(), 3);
    }
}
