//! Per-document field computation

use super::{CompiledHandle, DocLookup, ScriptContext, materialize_doc};
use crate::bindings::BindingSet;
use crate::error::ScriptResult;
use crate::value::ScriptValue;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

pub struct FieldContext;

impl ScriptContext for FieldContext {
    const NAME: &'static str = "field";
    type Factory = FieldScriptFactory;

    fn new_factory(script: CompiledHandle) -> Self::Factory {
        FieldScriptFactory { handle: script }
    }
}

pub struct FieldScriptFactory {
    handle: CompiledHandle,
}

impl FieldScriptFactory {
    pub fn is_result_deterministic(&self) -> bool {
        true
    }

    /// Bind `params` and the document fields the script reads
    pub fn new_instance(&self, params: Map<String, JsonValue>, doc: &dyn DocLookup) -> FieldScript {
        let doc = materialize_doc(doc, self.handle.script().doc_fields());
        FieldScript {
            handle: self.handle.clone(),
            bindings: BindingSet::new().with_params(params).with_doc(doc),
        }
    }
}

pub struct FieldScript {
    handle: CompiledHandle,
    bindings: BindingSet,
}

impl FieldScript {
    /// The computed field value, as returned by the script
    pub async fn execute(&self) -> ScriptResult<ScriptValue> {
        let execution = self.handle.run(self.bindings.clone()).await?;
        if execution.value.is_none() {
            debug!("field script produced no value");
        }
        Ok(execution.value)
    }
}
