//! Search request and response transforms

use super::{CompiledHandle, ScriptContext, run_transform};
use crate::error::ScriptResult;
use serde_json::{Map, Value as JsonValue};

pub struct SearchContext;

impl ScriptContext for SearchContext {
    const NAME: &'static str = "search";
    type Factory = SearchScriptFactory;

    fn new_factory(script: CompiledHandle) -> Self::Factory {
        SearchScriptFactory { handle: script }
    }
}

pub struct SearchScriptFactory {
    handle: CompiledHandle,
}

impl SearchScriptFactory {
    pub fn is_result_deterministic(&self) -> bool {
        true
    }

    pub fn new_instance(&self, params: Map<String, JsonValue>) -> SearchScript {
        SearchScript {
            handle: self.handle.clone(),
            params,
        }
    }
}

pub struct SearchScript {
    handle: CompiledHandle,
    params: Map<String, JsonValue>,
}

impl SearchScript {
    /// Run against a mutable request or response map; only `ctx` changes are kept
    pub async fn execute(&self, ctx: &mut Map<String, JsonValue>) -> ScriptResult<()> {
        run_transform(&self.handle, &self.params, ctx).await
    }
}
