//! Model construction and compilation errors.

use mf_core::MfError;
use mf_expr::ExprError;
use thiserror::Error;

/// Errors raised while defining, binding or compiling a model.
///
/// Binding errors (`UnknownSpecies`, `UnknownParameter`, `UnknownTemplate`,
/// `ArityMismatch`) are always raised before any mutation takes place.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Unknown species: {id}")]
    UnknownSpecies { id: String },

    #[error("Unknown parameter: {id}")]
    UnknownParameter { id: String },

    #[error("Unknown interaction template: {id}")]
    UnknownTemplate { id: String },

    #[error("Template {template} has no local variable {local}")]
    UnknownLocal { template: String, local: String },

    #[error("Arity mismatch binding {template}: expected {expected} {what}, got {actual}")]
    ArityMismatch {
        template: String,
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Template {id} is bound by {instances} live instance(s) and cannot be modified")]
    TemplateInUse { id: String, instances: usize },

    #[error("Model has not been compiled")]
    NotCompiled,

    #[error("Model is out of date (compiled at revision {compiled}, system at {current})")]
    ModelOutOfDate { compiled: u64, current: u64 },

    #[error("Expression error: {0}")]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Core(#[from] MfError),
}

pub type ModelResult<T> = Result<T, ModelError>;
