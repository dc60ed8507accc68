//! Compile-time error type.
//!
//! A single `Logic` variant carries the fully formatted message (spec.md §7:
//! `[<source>:line N] Error at '<token>': <message>`); `Io` wraps failures
//! reading an imported module file.

use std::fmt;

#[derive(Debug)]
pub enum CompileError {
    /// A source-level compile error, already formatted with file/line/token.
    Logic(String),
    /// Failure reading a source or imported module file.
    Io(std::io::Error),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Logic(msg) => write!(f, "{msg}"),
            CompileError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}
