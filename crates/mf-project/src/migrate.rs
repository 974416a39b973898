//! Schema migration framework.

use crate::ProjectError;
use crate::schema::ModelFile;

pub const LATEST_VERSION: u32 = 2;

pub fn migrate_to_latest(mut model: ModelFile) -> Result<ModelFile, ProjectError> {
    while model.version < LATEST_VERSION {
        model = migrate_one_version(model)?;
    }
    Ok(model)
}

fn migrate_one_version(model: ModelFile) -> Result<ModelFile, ProjectError> {
    match model.version {
        0 => migrate_v0_to_v1(model),
        1 => migrate_v1_to_v2(model),
        v => Err(ProjectError::Migration {
            what: format!("No migration path from version {}", v),
        }),
    }
}

fn migrate_v0_to_v1(mut model: ModelFile) -> Result<ModelFile, ProjectError> {
    model.version = 1;
    Ok(model)
}

/// Version 2 requires every species and rule to carry a display name.
fn migrate_v1_to_v2(mut model: ModelFile) -> Result<ModelFile, ProjectError> {
    for species in &mut model.species {
        if species.name.is_empty() {
            species.name = species.id.clone();
        }
    }
    for template in &mut model.templates {
        for rule in &mut template.rules {
            if rule.name.is_empty() {
                rule.name = format!("{}:{}", template.id, rule.variable);
            }
        }
    }

    model.version = 2;
    Ok(model)
}
