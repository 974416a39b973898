//! Error types for simulation operations.

use mf_core::MfError;
use mf_expr::ExprError;
use mf_model::ModelError;
use thiserror::Error;

/// Errors encountered during batch or real-time simulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Non-finite derivative for {species} at t={t}")]
    NonFinite { species: String, t: f64 },

    #[error("Step size underflow at t={t} (dt={dt})")]
    StepSizeUnderflow { t: f64, dt: f64 },

    #[error("Exceeded {max_steps} steps before reaching t={t_end}")]
    MaxSteps { max_steps: usize, t_end: f64 },

    #[error("A tick is already in progress")]
    TickInProgress,

    #[error("Species {species} has no sample to perturb")]
    MissingSample { species: String },

    #[error("Species {id} is not tracked by the buffer")]
    UnknownSpecies { id: String },

    #[error("Real-time loop is no longer running")]
    Stopped,

    #[error("Failed to start real-time worker: {message}")]
    Spawn { message: String },

    #[error("Real-time worker panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Core(#[from] MfError),
}

pub type SimResult<T> = Result<T, SimError>;
