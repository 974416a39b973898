//! Conversion between model files and live systems.

use std::collections::{BTreeMap, HashMap};

use mf_model::System;
use tracing::debug;

use crate::ProjectResult;
use crate::schema::{
    InteractionDef, ModelFile, ParameterDef, RuleDef, SpeciesDef, TemplateDef,
};
use crate::validate::validate_model;

/// Validate `model` and populate a fresh, uncompiled [`System`] from it.
pub fn build_system(model: &ModelFile) -> ProjectResult<System> {
    validate_model(model)?;

    let mut system = System::new();
    for s in &model.species {
        system.add_species(s.id.clone(), s.initial_value, s.name.clone())?;
    }
    for p in &model.parameters {
        system.add_parameter(p.id.clone(), p.value, p.name.clone())?;
    }
    for t in &model.templates {
        let template = system.define_interaction(t.id.clone(), t.variables.iter().cloned())?;
        for rule in &t.rules {
            template.set_rule(&rule.variable, &rule.expression, rule.name.clone())?;
        }
    }
    for i in &model.interactions {
        if i.is_named() {
            let bindings: HashMap<String, String> = i
                .bindings
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            system.add_interaction_named(&i.template, &bindings)?;
        } else {
            system.add_interaction(&i.template, &i.species, &i.parameters)?;
        }
    }

    debug!(
        name = %model.name,
        species = model.species.len(),
        parameters = model.parameters.len(),
        templates = model.templates.len(),
        interactions = model.interactions.len(),
        "built system from model file"
    );
    Ok(system)
}

/// Describe a live system as a model file.
///
/// Species are exported with their initial values; interactions are written
/// positionally. Run settings are left empty.
pub fn export_system(system: &System, name: impl Into<String>) -> ModelFile {
    let mut model = ModelFile::new(name);

    model.species = system
        .species()
        .iter()
        .map(|s| SpeciesDef {
            id: s.id.clone(),
            name: s.name.clone(),
            initial_value: s.initial_value,
        })
        .collect();
    model.parameters = system
        .parameters()
        .iter()
        .map(|p| ParameterDef {
            id: p.id.clone(),
            name: p.name.clone(),
            value: p.value,
        })
        .collect();
    model.templates = system
        .templates()
        .map(|t| TemplateDef {
            id: t.id().to_string(),
            variables: t.variables().to_vec(),
            rules: t
                .rules()
                .filter_map(|(variable, rule)| {
                    rule.expression().map(|expr| RuleDef {
                        variable: variable.to_string(),
                        expression: expr.to_string(),
                        name: rule.name().to_string(),
                    })
                })
                .collect(),
        })
        .collect();
    model.interactions = system
        .instances()
        .iter()
        .map(|inst| InteractionDef {
            template: inst.template_id().to_string(),
            species: inst
                .variable_bindings()
                .iter()
                .map(|(_, g)| g.clone())
                .collect(),
            parameters: inst
                .parameter_bindings()
                .iter()
                .map(|(_, g)| g.clone())
                .collect(),
            bindings: BTreeMap::new(),
        })
        .collect();

    model
}
