//! mf-project: model file format, validation and system construction.

pub mod build;
pub mod migrate;
pub mod schema;
pub mod validate;

use std::path::Path;

pub use build::{build_system, export_system};
pub use migrate::{LATEST_VERSION, migrate_to_latest};
pub use schema::*;
pub use validate::{ValidationError, validate_model};

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Migration error: {what}")]
    Migration { what: String },

    #[error("Model error: {0}")]
    Model(#[from] mf_model::ModelError),

    #[error("Unsupported file extension: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse, migrate and validate a YAML model document.
pub fn parse_yaml(content: &str) -> ProjectResult<ModelFile> {
    let model: ModelFile = serde_yaml::from_str(content)?;
    finish_load(model)
}

/// Parse, migrate and validate a JSON model document.
pub fn parse_json(content: &str) -> ProjectResult<ModelFile> {
    let model: ModelFile = serde_json::from_str(content)?;
    finish_load(model)
}

fn finish_load(model: ModelFile) -> ProjectResult<ModelFile> {
    let model = migrate_to_latest(model)?;
    validate_model(&model)?;
    Ok(model)
}

pub fn load_yaml(path: &Path) -> ProjectResult<ModelFile> {
    let content = std::fs::read_to_string(path)?;
    parse_yaml(&content)
}

pub fn save_yaml(path: &Path, model: &ModelFile) -> ProjectResult<()> {
    validate_model(model)?;
    let content = serde_yaml::to_string(model)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_json(path: &Path) -> ProjectResult<ModelFile> {
    let content = std::fs::read_to_string(path)?;
    parse_json(&content)
}

pub fn save_json(path: &Path, model: &ModelFile) -> ProjectResult<()> {
    validate_model(model)?;
    let content = serde_json::to_string_pretty(model)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load by extension: `.yaml`/`.yml` or `.json`.
pub fn load(path: &Path) -> ProjectResult<ModelFile> {
    match extension(path).as_str() {
        "yaml" | "yml" => load_yaml(path),
        "json" => load_json(path),
        other => Err(ProjectError::UnsupportedFormat(other.to_string())),
    }
}

/// Save by extension: `.yaml`/`.yml` or `.json`.
pub fn save(path: &Path, model: &ModelFile) -> ProjectResult<()> {
    match extension(path).as_str() {
        "yaml" | "yml" => save_yaml(path, model),
        "json" => save_json(path, model),
        other => Err(ProjectError::UnsupportedFormat(other.to_string())),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}
