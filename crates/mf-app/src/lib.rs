//! Shared application service layer for motif.
//!
//! This crate provides a unified interface for frontends, centralizing model
//! file handling, system compilation, batch and live runs and export.

pub mod error;
pub mod export;
pub mod progress;
pub mod project_service;
pub mod run_service;

// Re-export key types for convenience
pub use error::{AppError, AppResult};
pub use export::{export_csv, trajectory_to_csv};
pub use progress::{RunMode, RunProgressEvent, RunStage};
pub use project_service::{
    SpeciesSummary, build_and_compile, describe_species, load_model, save_model, validate_model,
};
pub use run_service::{
    BatchRequest, BatchResponse, Dose, LiveRequest, LiveResponse, RunTimingSummary, run_batch,
    run_batch_with_progress, run_live,
};
