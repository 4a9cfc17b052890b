//! Error types for pyscript-syntax

use crate::span::Location;
use thiserror::Error;

/// A lexing or parsing failure
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (line {}, column {})", location.line, location.column)]
pub struct SyntaxError {
    pub message: String,
    pub location: Location,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    pub fn line(&self) -> u32 {
        self.location.line
    }

    pub fn column(&self) -> u32 {
        self.location.column
    }
}

/// Result type alias for grammar operations
pub type SyntaxResult<T> = Result<T, SyntaxError>;
