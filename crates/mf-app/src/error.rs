//! Error types for the mf-app service layer.

use std::path::PathBuf;

/// Application error type that wraps errors from the backend crates
/// and provides a unified error interface for frontends.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Model file error: {0}")]
    Project(String),

    #[error("Failed to write {path}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Model validation failed: {0}")]
    Validation(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for mf-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<mf_project::ProjectError> for AppError {
    fn from(err: mf_project::ProjectError) -> Self {
        match err {
            mf_project::ProjectError::Validation(e) => AppError::Validation(e.to_string()),
            other => AppError::Project(other.to_string()),
        }
    }
}

impl From<mf_model::ModelError> for AppError {
    fn from(err: mf_model::ModelError) -> Self {
        AppError::Model(err.to_string())
    }
}

impl From<mf_sim::SimError> for AppError {
    fn from(err: mf_sim::SimError) -> Self {
        AppError::Simulation(err.to_string())
    }
}
