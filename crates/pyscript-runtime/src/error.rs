//! Error types for pyscript-runtime

use pyscript_syntax::SyntaxError;
use std::fmt;
use thiserror::Error;

/// Python exception classes the interpreter can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    Exception,
    ValueError,
    TypeError,
    KeyError,
    IndexError,
    NameError,
    ZeroDivisionError,
    AttributeError,
    ImportError,
    RecursionError,
    OverflowError,
    MemoryError,
    RuntimeError,
    /// Evaluation was cancelled from outside the session
    Interrupted,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 14] = [
        ExceptionKind::Exception,
        ExceptionKind::ValueError,
        ExceptionKind::TypeError,
        ExceptionKind::KeyError,
        ExceptionKind::IndexError,
        ExceptionKind::NameError,
        ExceptionKind::ZeroDivisionError,
        ExceptionKind::AttributeError,
        ExceptionKind::ImportError,
        ExceptionKind::RecursionError,
        ExceptionKind::OverflowError,
        ExceptionKind::MemoryError,
        ExceptionKind::RuntimeError,
        ExceptionKind::Interrupted,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExceptionKind::Exception => "Exception",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::ImportError => "ImportError",
            ExceptionKind::RecursionError => "RecursionError",
            ExceptionKind::OverflowError => "OverflowError",
            ExceptionKind::MemoryError => "MemoryError",
            ExceptionKind::RuntimeError => "RuntimeError",
            ExceptionKind::Interrupted => "Interrupted",
        }
    }

    /// Look up an exception class by its Python name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a traceback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub function: String,
    pub line: u32,
}

/// A Python exception raised during evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ExceptionKind,
    pub message: String,
    /// Innermost frame first
    pub traceback: Vec<TraceFrame>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind.name())
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl RuntimeError {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            traceback: Vec::new(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ValueError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::IndexError, message)
    }

    pub fn key_error(repr: impl Into<String>) -> Self {
        Self::new(ExceptionKind::KeyError, repr)
    }

    pub fn name_error(name: &str) -> Self {
        Self::new(
            ExceptionKind::NameError,
            format!("name '{name}' is not defined"),
        )
    }

    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::new(
            ExceptionKind::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ZeroDivisionError, message)
    }

    pub fn overflow() -> Self {
        Self::new(ExceptionKind::OverflowError, "integer overflow")
    }

    pub fn interrupted() -> Self {
        Self::new(ExceptionKind::Interrupted, "evaluation was interrupted")
    }

    pub fn is_interrupted(&self) -> bool {
        self.kind == ExceptionKind::Interrupted
    }

    pub(crate) fn push_frame(&mut self, function: impl Into<String>, line: u32) {
        self.traceback.push(TraceFrame {
            function: function.into(),
            line,
        });
    }

    /// Python-style traceback lines, outermost call first
    pub fn stack_summary(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.traceback.len() + 2);
        lines.push("Traceback (most recent call last):".to_string());
        for frame in self.traceback.iter().rev() {
            lines.push(format!(
                "File \"<script>\", line {}, in {}",
                frame.line, frame.function
            ));
        }
        lines.push(self.to_string());
        lines
    }
}

/// Errors surfaced by a [`Session`](crate::Session)
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// Source text failed to parse
    #[error("Syntax error at line {}:{} - {}", .0.line(), .0.column(), .0.message)]
    Syntax(#[from] SyntaxError),

    /// The script raised an exception
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The session was torn down and refuses further work
    #[error("session has been closed")]
    Closed,
}

impl SessionError {
    /// Stack summary for reporting, empty when there is no traceback
    pub fn stack_summary(&self) -> Vec<String> {
        match self {
            SessionError::Runtime(err) => err.stack_summary(),
            _ => Vec::new(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, SessionError::Runtime(err) if err.is_interrupted())
    }
}

/// Result type alias for evaluation
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = RuntimeError::name_error("foo");
        assert_eq!(err.to_string(), "NameError: name 'foo' is not defined");

        let err = RuntimeError::new(ExceptionKind::Exception, "");
        assert_eq!(err.to_string(), "Exception");
    }

    #[test]
    fn test_stack_summary_is_outermost_first() {
        let mut err = RuntimeError::value_error("bad");
        err.push_frame("inner", 3);
        err.push_frame("<module>", 7);
        let summary = err.stack_summary();
        assert_eq!(summary[1], "File \"<script>\", line 7, in <module>");
        assert_eq!(summary[2], "File \"<script>\", line 3, in inner");
        assert_eq!(summary[3], "ValueError: bad");
    }

    #[test]
    fn test_exception_kind_lookup() {
        assert_eq!(
            ExceptionKind::from_name("KeyError"),
            Some(ExceptionKind::KeyError)
        );
        assert_eq!(ExceptionKind::from_name("SystemExit"), None);
    }
}
