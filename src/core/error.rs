// This module defines the error types for the sysmips compiler using the thiserror crate.
// CompileError covers the internal invariant violations the core can detect: blocks that
// lack a terminator, phi instructions whose slot count disagrees with the predecessor list,
// uses that point at removed values, fixpoint iterations that fail to converge, and register
// allocation dead ends. Each variant carries the function name and enough context to find
// the offending node in an IR or machine dump. Parse errors from the textual IR reader and
// I/O failures from the command line tools share the same enum so the binaries can bubble
// everything up with `?`. CompileResult<T> is the crate wide alias for Result<T, CompileError>.

//! Error types for the sysmips compiler.
//!
//! Internal invariant violations are fatal: passes report them and the
//! compilation run stops. Nothing here is meant to be recovered from.

use thiserror::Error;

/// Main error type for the middle-end and backend.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{function}: block {block} has no terminator in last position")]
    MissingTerminator { function: String, block: String },

    #[error("{function}: phi in block {block} has {slots} incoming slots but {preds} predecessors")]
    PhiArity {
        function: String,
        block: String,
        slots: usize,
        preds: usize,
    },

    #[error("{function}: dangling use of {value} by {user}")]
    DanglingUse {
        function: String,
        value: String,
        user: String,
    },

    #[error("{function}: invariant violated: {detail}")]
    Invariant { function: String, detail: String },

    #[error("{function}: {analysis} did not converge after {rounds} rounds")]
    NonConvergence {
        function: String,
        analysis: &'static str,
        rounds: usize,
    },

    #[error("{function}: register allocation failed: {reason}")]
    RegisterAllocation { function: String, reason: String },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// Shorthand for the catch-all structural violation.
    pub fn invariant(function: &str, detail: impl Into<String>) -> Self {
        CompileError::Invariant {
            function: function.to_string(),
            detail: detail.into(),
        }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
