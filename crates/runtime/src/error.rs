//! Runtime error type (spec.md §7).
//!
//! A `Thrown` value that escapes every active try handler is what turns
//! into this type at the top of `vm_run`; everything else is resolved
//! internally by the VM's own try/throw unwind stack and never surfaces
//! as a Rust `Result::Err`.

use std::fmt;

use opo_core::Value;

use crate::format::format_value;

#[derive(Debug)]
pub enum RuntimeError {
    /// An interpreter/native guard raised this (division by zero, index out
    /// of bounds, ...) and no try handler caught it.
    Logic(String),
    /// A user `throw <value>` that went uncaught.
    Thrown(Value),
    Io(std::io::Error),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Logic(msg) => write!(f, "Runtime Error: {msg}"),
            RuntimeError::Thrown(v) => write!(f, "Unhandled Exception: {}", format_value(v)),
            RuntimeError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        RuntimeError::Io(e)
    }
}
