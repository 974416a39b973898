//! Error types for expression parsing and evaluation.

use thiserror::Error;

/// Errors raised while parsing, compiling or evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Parse error at offset {offset}: {message}")]
    Parse { message: String, offset: usize },

    #[error("Undefined symbol: {name}")]
    UndefinedSymbol { name: String },

    #[error("Duplicate name in scope: {name}")]
    DuplicateName { name: String },

    #[error("{func}() takes {expected} argument(s), got {actual}")]
    CallArity {
        func: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Scope width mismatch: expected {expected} values, got {actual}")]
    ScopeMismatch { expected: usize, actual: usize },
}

pub type ExprResult<T> = Result<T, ExprError>;
