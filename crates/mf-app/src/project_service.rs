//! Model file loading, saving, validation, and introspection.

use std::path::Path;

use mf_model::System;
use mf_project::ModelFile;
use tracing::info;

use crate::error::{AppError, AppResult};

/// Summary of a species for listing.
#[derive(Debug, Clone)]
pub struct SpeciesSummary {
    pub id: String,
    pub name: String,
    pub initial_value: f64,
    /// Compiled rate law, as text
    pub rate_law: String,
    /// Number of interaction terms summed into the rate law
    pub terms: usize,
}

/// Load, migrate and validate a model file (`.yaml`, `.yml` or `.json`).
pub fn load_model(path: &Path) -> AppResult<ModelFile> {
    let model = mf_project::load(path)?;
    info!(path = %path.display(), name = %model.name, "loaded model file");
    Ok(model)
}

/// Save a model file; the format follows the extension.
pub fn save_model(path: &Path, model: &ModelFile) -> AppResult<()> {
    mf_project::save(path, model).map_err(|e| match e {
        mf_project::ProjectError::Io(source) => AppError::FileWrite {
            path: path.to_path_buf(),
            source,
        },
        other => other.into(),
    })
}

/// Validate model structure and references.
pub fn validate_model(model: &ModelFile) -> AppResult<()> {
    mf_project::validate_model(model).map_err(|e| AppError::Validation(e.to_string()))
}

/// Build a system from a model file and compile it.
pub fn build_and_compile(model: &ModelFile) -> AppResult<System> {
    let mut system = mf_project::build_system(model)?;
    system.compile()?;
    Ok(system)
}

/// List every species with its compiled rate law.
pub fn describe_species(model: &ModelFile) -> AppResult<Vec<SpeciesSummary>> {
    let system = build_and_compile(model)?;
    let compiled = system.current_model()?;
    Ok(system
        .species()
        .iter()
        .zip(compiled.rate_laws())
        .map(|(species, law)| SpeciesSummary {
            id: species.id.clone(),
            name: species.name.clone(),
            initial_value: species.initial_value,
            rate_law: law.expr().to_string(),
            terms: law.terms(),
        })
        .collect())
}
