//! Binding templates to global species and parameters.

use std::collections::HashMap;
use std::sync::Arc;

use mf_core::InstanceId;
use mf_expr::Expr;

use crate::error::{ModelError, ModelResult};
use crate::registry::{Parameter, Registry, Species};
use crate::template::InteractionTemplate;

/// A template bound to concrete global ids.
///
/// Holds its own substituted copy of every rule; the template's trees are
/// never touched.
#[derive(Debug, Clone)]
pub struct InteractionInstance {
    id: InstanceId,
    template: Arc<InteractionTemplate>,
    /// (local variable, global species id), positional.
    variable_bindings: Vec<(String, String)>,
    /// (local parameter, global parameter id), positional.
    parameter_bindings: Vec<(String, String)>,
    /// (global species id, substituted term), in template rule order.
    substituted: Vec<(String, Expr)>,
}

impl InteractionInstance {
    /// Validate arguments and build an instance.
    ///
    /// Checks run in order: species exist, parameters exist, arity. Nothing
    /// is constructed unless all of them pass.
    pub fn bind<S, P>(
        id: InstanceId,
        template: &Arc<InteractionTemplate>,
        species_args: &[S],
        parameter_args: &[P],
        species: &Registry<Species>,
        parameters: &Registry<Parameter>,
    ) -> ModelResult<Self>
    where
        S: AsRef<str>,
        P: AsRef<str>,
    {
        for arg in species_args {
            if !species.contains(arg.as_ref()) {
                return Err(ModelError::UnknownSpecies {
                    id: arg.as_ref().to_string(),
                });
            }
        }
        for arg in parameter_args {
            if !parameters.contains(arg.as_ref()) {
                return Err(ModelError::UnknownParameter {
                    id: arg.as_ref().to_string(),
                });
            }
        }

        let variables = template.variables();
        let local_parameters = template.parameters();
        if species_args.len() != variables.len() {
            return Err(ModelError::ArityMismatch {
                template: template.id().to_string(),
                what: "species",
                expected: variables.len(),
                actual: species_args.len(),
            });
        }
        if parameter_args.len() != local_parameters.len() {
            return Err(ModelError::ArityMismatch {
                template: template.id().to_string(),
                what: "parameters",
                expected: local_parameters.len(),
                actual: parameter_args.len(),
            });
        }

        let variable_bindings: Vec<(String, String)> = variables
            .iter()
            .zip(species_args)
            .map(|(local, global)| (local.clone(), global.as_ref().to_string()))
            .collect();
        let parameter_bindings: Vec<(String, String)> = local_parameters
            .into_iter()
            .zip(parameter_args)
            .map(|(local, global)| (local, global.as_ref().to_string()))
            .collect();

        let table: HashMap<String, String> = variable_bindings
            .iter()
            .chain(parameter_bindings.iter())
            .cloned()
            .collect();

        let mut substituted = Vec::new();
        for (local, global) in &variable_bindings {
            let Some(source) = template.rule(local).and_then(|r| r.expression()) else {
                continue;
            };
            let mut term = source.clone();
            term.rename_symbols(&table);
            substituted.push((global.clone(), term));
        }

        Ok(Self {
            id,
            template: Arc::clone(template),
            variable_bindings,
            parameter_bindings,
            substituted,
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn template(&self) -> &Arc<InteractionTemplate> {
        &self.template
    }

    pub fn template_id(&self) -> &str {
        self.template.id()
    }

    pub fn variable_bindings(&self) -> &[(String, String)] {
        &self.variable_bindings
    }

    pub fn parameter_bindings(&self) -> &[(String, String)] {
        &self.parameter_bindings
    }

    /// Global id bound to a local symbol (variable or parameter).
    pub fn binding(&self, local: &str) -> Option<&str> {
        self.variable_bindings
            .iter()
            .chain(self.parameter_bindings.iter())
            .find(|(l, _)| l == local)
            .map(|(_, g)| g.as_str())
    }

    pub fn binds_species(&self, species_id: &str) -> bool {
        self.variable_bindings.iter().any(|(_, g)| g == species_id)
    }

    pub fn binds_parameter(&self, parameter_id: &str) -> bool {
        self.parameter_bindings.iter().any(|(_, g)| g == parameter_id)
    }

    /// Substituted terms keyed by target species, in template rule order.
    pub fn substituted(&self) -> &[(String, Expr)] {
        &self.substituted
    }

    /// Substituted terms contributing to one species.
    pub fn terms_for<'a>(&'a self, species_id: &'a str) -> impl Iterator<Item = &'a Expr> + 'a {
        self.substituted
            .iter()
            .filter(move |(target, _)| target == species_id)
            .map(|(_, expr)| expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::Id;

    fn registries() -> (Registry<Species>, Registry<Parameter>) {
        let mut species = Registry::new();
        species.insert(Species::new("Glucose", 5.0, "glucose")).unwrap();
        species.insert(Species::new("Insulin", 1.0, "insulin")).unwrap();
        let mut parameters = Registry::new();
        parameters.insert(Parameter::new("eta", 0.1, "uptake")).unwrap();
        (species, parameters)
    }

    fn uptake_template() -> Arc<InteractionTemplate> {
        let mut t = InteractionTemplate::new("uptake", ["a"]).unwrap();
        t.set_rule("a", "-alpha*a", "uptake").unwrap();
        Arc::new(t)
    }

    fn id0() -> InstanceId {
        Id::from_index(0).unwrap()
    }

    #[test]
    fn binds_and_substitutes() {
        let (species, parameters) = registries();
        let template = uptake_template();
        let inst =
            InteractionInstance::bind(id0(), &template, &["Glucose"], &["eta"], &species, &parameters)
                .unwrap();

        assert_eq!(inst.binding("a"), Some("Glucose"));
        assert_eq!(inst.binding("alpha"), Some("eta"));
        assert_eq!(inst.substituted().len(), 1);
        assert_eq!(inst.substituted()[0].0, "Glucose");
        assert_eq!(inst.substituted()[0].1.to_string(), "-eta * Glucose");
        // template is untouched
        assert_eq!(
            template.rule("a").unwrap().expression().unwrap().to_string(),
            "-alpha * a"
        );
    }

    #[test]
    fn unknown_species_checked_first() {
        let (species, parameters) = registries();
        let err = InteractionInstance::bind(
            id0(),
            &uptake_template(),
            &["Nope"],
            &["missing", "extra"],
            &species,
            &parameters,
        )
        .unwrap_err();
        assert_eq!(err, ModelError::UnknownSpecies { id: "Nope".into() });
    }

    #[test]
    fn unknown_parameter_checked_before_arity() {
        let (species, parameters) = registries();
        let err = InteractionInstance::bind(
            id0(),
            &uptake_template(),
            &["Glucose", "Insulin"],
            &["missing"],
            &species,
            &parameters,
        )
        .unwrap_err();
        assert_eq!(err, ModelError::UnknownParameter { id: "missing".into() });
    }

    #[test]
    fn arity_mismatch_on_parameters() {
        let (species, parameters) = registries();
        let err = InteractionInstance::bind(
            id0(),
            &uptake_template(),
            &["Glucose"],
            &[] as &[&str],
            &species,
            &parameters,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::ArityMismatch {
                template: "uptake".into(),
                what: "parameters",
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn local_names_shared_with_globals_are_not_chained() {
        // a -> b and b -> a must swap, not collapse
        let mut species = Registry::new();
        species.insert(Species::new("a", 0.0, "a")).unwrap();
        species.insert(Species::new("b", 0.0, "b")).unwrap();
        let parameters = Registry::new();
        let mut t = InteractionTemplate::new("swap", ["a", "b"]).unwrap();
        t.set_rule("a", "b - a", "").unwrap();
        t.set_rule("b", "a - b", "").unwrap();
        let t = Arc::new(t);

        let inst =
            InteractionInstance::bind(id0(), &t, &["b", "a"], &[] as &[&str], &species, &parameters)
                .unwrap();
        assert_eq!(inst.substituted()[0], ("b".to_string(), mf_expr::parse("a - b").unwrap()));
        assert_eq!(inst.substituted()[1], ("a".to_string(), mf_expr::parse("b - a").unwrap()));
    }
}
