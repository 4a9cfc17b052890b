//! Compiled scripts

use crate::analyzer::{self, Diagnostic, DocFieldAccess};
use pyscript_syntax::Program;
use std::sync::Arc;
use tracing::debug;

/// Immutable source text plus everything derived from it at compile time.
///
/// Validation runs once here; every invocation shares the result.
#[derive(Debug)]
pub struct CompiledScript {
    source: Arc<str>,
    context: &'static str,
    program: Option<Arc<Program>>,
    diagnostics: Vec<Diagnostic>,
    doc_fields: DocFieldAccess,
}

impl CompiledScript {
    pub fn compile(source: &str, context: &'static str, max_diagnostics: usize) -> Self {
        // The grammar expects every statement to end with a newline
        let analysis = analyzer::analyze(&format!("{source}\n"), max_diagnostics);
        let doc_fields = match &analysis.program {
            Some(program) => analyzer::accessed_doc_fields(program),
            None => DocFieldAccess::Dynamic,
        };
        debug!(
            context,
            diagnostics = analysis.diagnostics.len(),
            dynamic_doc = doc_fields.is_dynamic(),
            "script compiled"
        );
        Self {
            source: Arc::from(source),
            context,
            program: analysis.program.map(Arc::new),
            diagnostics: analysis.diagnostics,
            doc_fields,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Extension point the script was compiled for
    pub fn context(&self) -> &'static str {
        self.context
    }

    pub fn program(&self) -> Option<&Arc<Program>> {
        self.program.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty() && self.program.is_some()
    }

    /// Document fields the script reads
    pub fn doc_fields(&self) -> &DocFieldAccess {
        &self.doc_fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_valid() {
        let script = CompiledScript::compile("doc['a'] + 1", "field", 16);
        assert!(script.is_valid());
        assert_eq!(script.context(), "field");
        assert!(script.doc_fields().includes("a"));
        assert!(!script.doc_fields().includes("b"));
    }

    #[test]
    fn test_compile_keeps_diagnostics() {
        let script = CompiledScript::compile("while True:\n    pass", "score", 16);
        assert!(!script.is_valid());
        assert_eq!(script.diagnostics().len(), 1);
        assert!(script.program().is_some());

        let script = CompiledScript::compile("x = (", "score", 16);
        assert!(script.program().is_none());
        assert!(script.doc_fields().is_dynamic());
    }
}
