//! Model file validation logic.

use std::collections::{HashMap, HashSet};

use mf_model::InteractionTemplate;

use crate::schema::{InteractionDef, ModelFile, TemplateDef};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid expression in {context}: {message}")]
    InvalidExpression { context: String, message: String },

    #[error("Arity mismatch in {context}: expected {expected} {what}, got {actual}")]
    Arity {
        context: String,
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_model(model: &ModelFile) -> Result<(), ValidationError> {
    if model.version > crate::migrate::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: model.version,
        });
    }

    // Species and parameters share one evaluation scope.
    let mut species_ids = HashSet::new();
    for species in &model.species {
        if !species_ids.insert(species.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: species.id.clone(),
                context: "species".to_string(),
            });
        }
        validate_finite(&format!("species '{}' initial_value", species.id), species.initial_value)?;
    }
    let mut parameter_ids = HashSet::new();
    for parameter in &model.parameters {
        if species_ids.contains(parameter.id.as_str())
            || !parameter_ids.insert(parameter.id.as_str())
        {
            return Err(ValidationError::DuplicateId {
                id: parameter.id.clone(),
                context: "parameters".to_string(),
            });
        }
        validate_finite(&format!("parameter '{}' value", parameter.id), parameter.value)?;
    }

    let mut templates = HashMap::new();
    for def in &model.templates {
        if templates.contains_key(def.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: def.id.clone(),
                context: "templates".to_string(),
            });
        }
        templates.insert(def.id.as_str(), validate_template(def)?);
    }

    for (index, interaction) in model.interactions.iter().enumerate() {
        let context = format!("interaction #{} ({})", index, interaction.template);
        let template = templates.get(interaction.template.as_str()).ok_or_else(|| {
            ValidationError::MissingReference {
                id: interaction.template.clone(),
                context: format!("{context} template"),
            }
        })?;
        validate_interaction(interaction, template, &species_ids, &parameter_ids, &context)?;
    }

    if let Some(sim) = &model.simulation {
        validate_finite("simulation t0", sim.t0)?;
        validate_finite("simulation tf", sim.tf)?;
        if sim.tf < sim.t0 {
            return Err(ValidationError::InvalidValue {
                field: "simulation tf".to_string(),
                value: sim.tf.to_string(),
                reason: "must not precede t0".to_string(),
            });
        }
        sim.options
            .validate()
            .map_err(|e| invalid_section("simulation options", e))?;
    }

    if let Some(realtime) = &model.realtime {
        realtime
            .validate()
            .map_err(|e| invalid_section("realtime", e))?;
    }

    Ok(())
}

/// Check a template definition and return the template it describes.
fn validate_template(def: &TemplateDef) -> Result<InteractionTemplate, ValidationError> {
    let context = format!("template '{}'", def.id);
    if def.variables.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: format!("{context} variables"),
            value: "[]".to_string(),
            reason: "at least one local variable is required".to_string(),
        });
    }
    let mut template = InteractionTemplate::new(def.id.clone(), def.variables.iter().cloned())
        .map_err(|_| ValidationError::DuplicateId {
            id: def.id.clone(),
            context: format!("{context} variables"),
        })?;

    let mut seen = HashSet::new();
    for rule in &def.rules {
        if !def.variables.contains(&rule.variable) {
            return Err(ValidationError::MissingReference {
                id: rule.variable.clone(),
                context: format!("{context} rules"),
            });
        }
        if !seen.insert(rule.variable.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: rule.variable.clone(),
                context: format!("{context} rules"),
            });
        }
        template
            .set_rule(&rule.variable, &rule.expression, rule.name.clone())
            .map_err(|e| ValidationError::InvalidExpression {
                context: format!("{context} rule '{}'", rule.variable),
                message: e.to_string(),
            })?;
    }
    Ok(template)
}

fn validate_interaction(
    interaction: &InteractionDef,
    template: &InteractionTemplate,
    species_ids: &HashSet<&str>,
    parameter_ids: &HashSet<&str>,
    context: &str,
) -> Result<(), ValidationError> {
    let local_parameters = template.parameters();

    if interaction.is_named() {
        if !interaction.species.is_empty() || !interaction.parameters.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: format!("{context} bindings"),
                value: interaction.template.clone(),
                reason: "use either positional species/parameters or named bindings".to_string(),
            });
        }
        for local in template.variables().iter().chain(local_parameters.iter()) {
            if !interaction.bindings.contains_key(local) {
                return Err(ValidationError::MissingReference {
                    id: local.clone(),
                    context: format!("{context} bindings"),
                });
            }
        }
        for (local, global) in &interaction.bindings {
            let is_variable = template.variables().contains(local);
            let is_parameter = local_parameters.contains(local);
            let known = if is_variable {
                species_ids.contains(global.as_str())
            } else if is_parameter {
                parameter_ids.contains(global.as_str())
            } else {
                return Err(ValidationError::MissingReference {
                    id: local.clone(),
                    context: format!("template '{}' locals", template.id()),
                });
            };
            if !known {
                return Err(ValidationError::MissingReference {
                    id: global.clone(),
                    context: format!("{context} binding '{local}'"),
                });
            }
        }
        return Ok(());
    }

    for id in &interaction.species {
        if !species_ids.contains(id.as_str()) {
            return Err(ValidationError::MissingReference {
                id: id.clone(),
                context: format!("{context} species"),
            });
        }
    }
    for id in &interaction.parameters {
        if !parameter_ids.contains(id.as_str()) {
            return Err(ValidationError::MissingReference {
                id: id.clone(),
                context: format!("{context} parameters"),
            });
        }
    }
    if interaction.species.len() != template.variables().len() {
        return Err(ValidationError::Arity {
            context: context.to_string(),
            what: "species",
            expected: template.variables().len(),
            actual: interaction.species.len(),
        });
    }
    if interaction.parameters.len() != local_parameters.len() {
        return Err(ValidationError::Arity {
            context: context.to_string(),
            what: "parameters",
            expected: local_parameters.len(),
            actual: interaction.parameters.len(),
        });
    }
    Ok(())
}

fn validate_finite(field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be finite".to_string(),
        });
    }
    Ok(())
}

fn invalid_section(field: &str, err: mf_sim::SimError) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: String::new(),
        reason: err.to_string(),
    }
}
