//! Error types for pyscript-engine

use crate::analyzer::Diagnostic;
use std::time::Duration;
use thiserror::Error;

/// Language tag attached to every script error
pub const LANG: &str = "python";

/// Result type for script compilation and execution
pub type ScriptResult<T> = Result<T, ScriptException>;

/// Classification of a [`ScriptException`]
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptErrorKind {
    /// Rejected by the semantic analyzer; never executed
    InvalidScript(Vec<Diagnostic>),
    /// No adapter is registered for the requested extension point
    UnsupportedContext(String),
    /// The time budget elapsed before the evaluation finished
    Timeout(Duration),
    /// The script raised, or the evaluation backend failed
    ExecutionFailed,
}

/// The single error type surfaced to the host
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ScriptException {
    pub kind: ScriptErrorKind,
    pub message: String,
    /// Offending source text
    pub script: String,
    pub lang: &'static str,
    /// Extension point name, when known
    pub context: Option<String>,
    /// Best-effort stack summary, outermost frame first
    pub stack: Vec<String>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ScriptException {
    fn new(kind: ScriptErrorKind, message: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            script: script.into(),
            lang: LANG,
            context: None,
            stack: Vec::new(),
            source: None,
        }
    }

    pub fn invalid_script(script: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        let message = diagnostics
            .iter()
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let mut err = Self::new(ScriptErrorKind::InvalidScript(Vec::new()), message, script);
        err.stack = diagnostics
            .iter()
            .map(|d| format!("line {}:{} - {}", d.line, d.column, d.message))
            .collect();
        err.kind = ScriptErrorKind::InvalidScript(diagnostics);
        err
    }

    pub fn unsupported_context(context: &str, script: impl Into<String>) -> Self {
        let mut err = Self::new(
            ScriptErrorKind::UnsupportedContext(context.to_string()),
            format!("Python engine does not know how to handle script context [{context}]"),
            script,
        );
        err.context = Some(context.to_string());
        err
    }

    pub fn timeout(budget: Duration, script: impl Into<String>) -> Self {
        Self::new(
            ScriptErrorKind::Timeout(budget),
            format!(
                "Script execution timed out after {} seconds",
                format_seconds(budget)
            ),
            script,
        )
    }

    pub fn execution_failed<E>(cause: E, stack: Vec<String>, script: impl Into<String>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut err = Self::new(
            ScriptErrorKind::ExecutionFailed,
            format!("Script execution failed with error: {cause}"),
            script,
        );
        err.stack = stack;
        err.source = Some(Box::new(cause));
        err
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ScriptErrorKind::Timeout(_))
    }

    pub fn is_invalid_script(&self) -> bool {
        matches!(self.kind, ScriptErrorKind::InvalidScript(_))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match &self.kind {
            ScriptErrorKind::InvalidScript(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}

/// Seconds rounded to the millisecond, without trailing zeros
fn format_seconds(budget: Duration) -> String {
    let millis = (budget.as_micros() + 500) / 1000;
    let (secs, frac) = (millis / 1000, millis % 1000);
    if frac == 0 {
        secs.to_string()
    } else {
        format!("{secs}.{frac:03}").trim_end_matches('0').to_string()
    }
}

/// Worker pool failures
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool '{0}' is closed")]
    Closed(String),

    #[error("worker task panicked: {0}")]
    Panicked(String),

    #[error("worker task was cancelled")]
    Cancelled,

    #[error("failed to start worker thread: {0}")]
    Spawn(String),
}

/// Waiting for engine readiness failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WarmupError {
    #[error("warmup has not been started")]
    NotStarted,

    #[error("warmup did not finish within {0:?}")]
    Timeout(Duration),

    #[error("warmup failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::DiagnosticCode;

    #[test]
    fn test_timeout_message() {
        let err = ScriptException::timeout(Duration::from_secs(20), "while x: pass");
        assert_eq!(err.to_string(), "Script execution timed out after 20 seconds");
        assert!(err.is_timeout());
        assert_eq!(err.lang, "python");

        let err = ScriptException::timeout(Duration::from_millis(250), "");
        assert_eq!(err.message, "Script execution timed out after 0.25 seconds");
    }

    #[test]
    fn test_timeout_message_rounds_to_millis() {
        assert_eq!(format_seconds(Duration::from_micros(1_000_400)), "1");
        assert_eq!(format_seconds(Duration::from_micros(1_000_600)), "1.001");
        assert_eq!(format_seconds(Duration::from_micros(2_999_700)), "3");
        assert_eq!(format_seconds(Duration::from_millis(1_050)), "1.05");
        assert_eq!(format_seconds(Duration::from_micros(300)), "0");
    }

    #[test]
    fn test_unsupported_context_message() {
        let err = ScriptException::unsupported_context("aggs", "1");
        assert_eq!(
            err.to_string(),
            "Python engine does not know how to handle script context [aggs]"
        );
        assert_eq!(err.context.as_deref(), Some("aggs"));
    }

    #[test]
    fn test_invalid_script_carries_diagnostics() {
        let diagnostic = Diagnostic {
            code: DiagnosticCode::UnreachableLoop,
            message: "Unreachable code: while False loop will never execute".into(),
            line: 1,
            column: 1,
        };
        let err = ScriptException::invalid_script("while False:\n    pass", vec![diagnostic]);
        assert!(err.is_invalid_script());
        assert_eq!(err.diagnostics().len(), 1);
        assert_eq!(err.message, "Unreachable code: while False loop will never execute");
        assert_eq!(err.stack.len(), 1);
    }

    #[test]
    fn test_execution_failed_keeps_cause() {
        let err = ScriptException::execution_failed(PoolError::Cancelled, Vec::new(), "x");
        assert_eq!(
            err.to_string(),
            "Script execution failed with error: worker task was cancelled"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
