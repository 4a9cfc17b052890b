//! Relevance scoring

use super::{CompiledHandle, DocLookup, ScriptContext, materialize_doc};
use crate::bindings::BindingSet;
use crate::error::ScriptResult;
use crate::value::ScriptValue;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

const EXPLANATION: &str = "Use user-provided Python expression to calculate the score of the document";

pub struct ScoreContext;

impl ScriptContext for ScoreContext {
    const NAME: &'static str = "score";
    type Factory = ScoreScriptFactory;

    fn new_factory(script: CompiledHandle) -> Self::Factory {
        ScoreScriptFactory { handle: script }
    }
}

/// Receives a description of how a score was computed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExplanationHolder {
    description: Option<String>,
}

impl ExplanationHolder {
    pub fn set(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    pub fn get(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

pub struct ScoreScriptFactory {
    handle: CompiledHandle,
}

impl ScoreScriptFactory {
    pub fn is_result_deterministic(&self) -> bool {
        true
    }

    /// The host must compute the running score before invoking
    pub fn needs_score(&self) -> bool {
        true
    }

    pub fn new_instance(&self, params: Map<String, JsonValue>, doc: &dyn DocLookup) -> ScoreScript {
        ScoreScript {
            handle: self.handle.clone(),
            params,
            doc: materialize_doc(doc, self.handle.script().doc_fields()),
        }
    }
}

pub struct ScoreScript {
    handle: CompiledHandle,
    params: Map<String, JsonValue>,
    doc: Map<String, JsonValue>,
}

impl ScoreScript {
    /// Compute a score from the running `score`. Non-numeric results score 0.
    pub async fn execute(
        &self,
        score: f64,
        explanation: Option<&mut ExplanationHolder>,
    ) -> ScriptResult<f64> {
        if let Some(explanation) = explanation {
            explanation.set(EXPLANATION);
        }
        let bindings = BindingSet::new()
            .with_params(self.params.clone())
            .with_doc(self.doc.clone())
            .with_score(score);

        let execution = self.handle.run(bindings).await?;
        Ok(match execution.value {
            ScriptValue::Number(n) => n,
            ScriptValue::None => {
                debug!("score script produced no value, scoring 0");
                0.0
            }
            other => {
                warn!(result = %other, "score script returned a non-numeric value, scoring 0");
                0.0
            }
        })
    }
}
