//! Query and response templating

use super::{CompiledHandle, ScriptContext};
use crate::bindings::BindingSet;
use crate::error::ScriptResult;
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

pub struct TemplateContext;

impl ScriptContext for TemplateContext {
    const NAME: &'static str = "template";
    type Factory = TemplateScriptFactory;

    fn new_factory(script: CompiledHandle) -> Self::Factory {
        TemplateScriptFactory { handle: script }
    }
}

pub struct TemplateScriptFactory {
    handle: CompiledHandle,
}

impl TemplateScriptFactory {
    pub fn is_result_deterministic(&self) -> bool {
        true
    }

    pub fn new_instance(&self, params: Map<String, JsonValue>) -> TemplateScript {
        TemplateScript {
            handle: self.handle.clone(),
            bindings: BindingSet::new().with_params(params),
        }
    }
}

pub struct TemplateScript {
    handle: CompiledHandle,
    bindings: BindingSet,
}

impl TemplateScript {
    /// Rendered text; empty when the script produced no value
    pub async fn execute(&self) -> ScriptResult<String> {
        let execution = self.handle.run(self.bindings.clone()).await?;
        if execution.value.is_none() {
            warn!("template script produced no value");
        }
        Ok(execution.value.to_text())
    }
}
