//! Compilation error type.

use std::fmt;

/// A fatal compilation error: a message plus the source line of the token
/// that triggered it. The first error aborts the compile; there is no
/// recovery.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    pub line: i32,
}

impl CompileError {
    pub fn new(message: impl Into<String>, line: i32) -> CompileError {
        CompileError {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

impl std::error::Error for CompileError {}
