//! Ingest pipeline transforms

use super::{CompiledHandle, ScriptContext, run_transform};
use crate::error::ScriptResult;
use serde_json::{Map, Value as JsonValue};

pub struct IngestContext;

impl ScriptContext for IngestContext {
    const NAME: &'static str = "ingest";
    type Factory = IngestScriptFactory;

    fn new_factory(script: CompiledHandle) -> Self::Factory {
        IngestScriptFactory { handle: script }
    }
}

pub struct IngestScriptFactory {
    handle: CompiledHandle,
}

impl IngestScriptFactory {
    pub fn is_result_deterministic(&self) -> bool {
        true
    }

    pub fn new_instance(&self, params: Map<String, JsonValue>) -> IngestScript {
        IngestScript {
            handle: self.handle.clone(),
            params,
        }
    }
}

pub struct IngestScript {
    handle: CompiledHandle,
    params: Map<String, JsonValue>,
}

impl IngestScript {
    /// Run against the document being ingested. The script's return value is ignored;
    /// its changes to `ctx` are written back.
    pub async fn execute(&self, ctx: &mut Map<String, JsonValue>) -> ScriptResult<()> {
        run_transform(&self.handle, &self.params, ctx).await
    }
}
