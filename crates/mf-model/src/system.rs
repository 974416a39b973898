//! The caller-owned model aggregate.

use std::collections::HashMap;
use std::sync::Arc;

use mf_core::{IdAllocator, InstanceId, MfError, ensure_all_finite, ensure_finite};
use tracing::{debug, info};

use crate::compiler::{Model, ModelCompiler};
use crate::error::{ModelError, ModelResult};
use crate::instance::InteractionInstance;
use crate::registry::{Parameter, Registry, Species};
use crate::template::InteractionTemplate;

/// Registries, templates, live instances and the last compiled model.
///
/// Every structural change (species, parameter, template or instance added
/// or removed) bumps an internal revision. `compile()` must be called after
/// structural changes; [`System::current_model`] refuses a model compiled
/// from an older revision instead of silently using it.
#[derive(Debug, Default)]
pub struct System {
    species: Registry<Species>,
    parameters: Registry<Parameter>,
    templates: Registry<Arc<InteractionTemplate>>,
    instances: Vec<InteractionInstance>,
    instance_ids: IdAllocator,
    model: Option<Model>,
    revision: u64,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn ensure_free_id(&self, id: &str) -> ModelResult<()> {
        if self.species.contains(id) {
            return Err(ModelError::DuplicateId {
                kind: "species",
                id: id.to_string(),
            });
        }
        if self.parameters.contains(id) {
            return Err(ModelError::DuplicateId {
                kind: "parameter",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // --- registries -------------------------------------------------------

    /// Declare a species. Ids are shared with parameters and must be unique
    /// across both, since both live in one evaluation scope.
    pub fn add_species(
        &mut self,
        id: impl Into<String>,
        initial_value: f64,
        name: impl Into<String>,
    ) -> ModelResult<()> {
        let id = id.into();
        self.ensure_free_id(&id)?;
        ensure_finite(initial_value, "species initial value")?;
        let _ = self.species.insert(Species::new(id, initial_value, name));
        self.touch();
        Ok(())
    }

    pub fn add_parameter(
        &mut self,
        id: impl Into<String>,
        value: f64,
        name: impl Into<String>,
    ) -> ModelResult<()> {
        let id = id.into();
        self.ensure_free_id(&id)?;
        ensure_finite(value, "parameter value")?;
        let _ = self.parameters.insert(Parameter::new(id, value, name));
        self.touch();
        Ok(())
    }

    /// Update a parameter's value. Not a structural change.
    pub fn set_parameter(&mut self, id: &str, value: f64) -> ModelResult<()> {
        ensure_finite(value, "parameter value")?;
        let parameter = self
            .parameters
            .get_mut(id)
            .ok_or_else(|| ModelError::UnknownParameter { id: id.to_string() })?;
        parameter.value = value;
        Ok(())
    }

    /// Overwrite a species' current value. Not a structural change.
    pub fn set_species_value(&mut self, id: &str, value: f64) -> ModelResult<()> {
        ensure_finite(value, "species value")?;
        let species = self
            .species
            .get_mut(id)
            .ok_or_else(|| ModelError::UnknownSpecies { id: id.to_string() })?;
        species.value = value;
        Ok(())
    }

    /// Restore every species to its initial value.
    pub fn reset_species(&mut self) {
        for s in self.species.iter_mut() {
            s.value = s.initial_value;
        }
    }

    pub fn species(&self) -> &Registry<Species> {
        &self.species
    }

    pub fn parameters(&self) -> &Registry<Parameter> {
        &self.parameters
    }

    /// Current species values in declaration order.
    pub fn state_vector(&self) -> Vec<f64> {
        self.species.iter().map(|s| s.value).collect()
    }

    /// Current parameter values in declaration order.
    pub fn parameter_vector(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }

    /// Write a declaration-ordered state vector back into species values.
    pub fn write_back(&mut self, values: &[f64]) -> ModelResult<()> {
        if values.len() != self.species.len() {
            return Err(MfError::IndexOob {
                what: "write-back state vector",
                index: values.len(),
                len: self.species.len(),
            }
            .into());
        }
        ensure_all_finite(values, "write-back state vector")?;
        for (s, &v) in self.species.iter_mut().zip(values) {
            s.value = v;
        }
        Ok(())
    }

    // --- templates --------------------------------------------------------

    /// Define a new template with one empty rule per local species symbol.
    pub fn define_interaction<I, S>(
        &mut self,
        name: impl Into<String>,
        local_species_ids: I,
    ) -> ModelResult<&mut InteractionTemplate>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let template = InteractionTemplate::new(name, local_species_ids)?;
        let name = template.id().to_string();
        if self.templates.contains(&name) {
            return Err(ModelError::DuplicateId {
                kind: "template",
                id: name,
            });
        }
        let _ = self.templates.insert(Arc::new(template));
        self.touch();
        self.template_mut(&name)
    }

    pub fn template(&self, name: &str) -> ModelResult<&Arc<InteractionTemplate>> {
        self.templates
            .get(name)
            .ok_or_else(|| ModelError::UnknownTemplate { id: name.to_string() })
    }

    /// Mutable access to a template that no live instance binds yet.
    pub fn template_mut(&mut self, name: &str) -> ModelResult<&mut InteractionTemplate> {
        let instances = self
            .instances
            .iter()
            .filter(|i| i.template_id() == name)
            .count();
        let template = self
            .templates
            .get_mut(name)
            .ok_or_else(|| ModelError::UnknownTemplate { id: name.to_string() })?;
        Arc::get_mut(template).ok_or_else(|| ModelError::TemplateInUse {
            id: name.to_string(),
            instances,
        })
    }

    /// Parse and set the rule of `local` in template `name`.
    pub fn set_rule(
        &mut self,
        name: &str,
        local: &str,
        expr_text: &str,
        rule_name: impl Into<String>,
    ) -> ModelResult<()> {
        self.template_mut(name)?.set_rule(local, expr_text, rule_name)?;
        self.touch();
        Ok(())
    }

    pub fn templates(&self) -> impl Iterator<Item = &Arc<InteractionTemplate>> {
        self.templates.iter()
    }

    /// Remove a template and every instance of it.
    pub fn remove_template(&mut self, name: &str) -> ModelResult<usize> {
        if !self.templates.contains(name) {
            return Err(ModelError::UnknownTemplate { id: name.to_string() });
        }
        let removed = self.remove_interactions_by_name(name);
        let _ = self.templates.remove(name);
        self.touch();
        Ok(removed)
    }

    // --- instances --------------------------------------------------------

    /// Bind template `name` positionally and register the instance.
    ///
    /// Reject-or-commit: on error nothing in the system changes.
    pub fn add_interaction<S, P>(
        &mut self,
        name: &str,
        species_args: &[S],
        parameter_args: &[P],
    ) -> ModelResult<InstanceId>
    where
        S: AsRef<str>,
        P: AsRef<str>,
    {
        let template = Arc::clone(self.template(name)?);
        let mut ids = self.instance_ids.clone();
        let id = ids.allocate().ok_or(MfError::Invariant {
            what: "instance id space exhausted",
        })?;
        let instance = InteractionInstance::bind(
            id,
            &template,
            species_args,
            parameter_args,
            &self.species,
            &self.parameters,
        )?;
        debug!(
            instance = %id,
            template = name,
            terms = instance.substituted().len(),
            "bound interaction"
        );
        self.instance_ids = ids;
        self.instances.push(instance);
        self.touch();
        Ok(id)
    }

    /// Bind template `name` by local symbol instead of by position.
    ///
    /// Every local variable and parameter must be present in `bindings`;
    /// keys that are not local symbols of the template are rejected.
    pub fn add_interaction_named(
        &mut self,
        name: &str,
        bindings: &HashMap<String, String>,
    ) -> ModelResult<InstanceId> {
        let template = Arc::clone(self.template(name)?);
        let variables = template.variables();
        let local_parameters = template.parameters();

        for key in bindings.keys() {
            let known = variables.iter().any(|v| v == key) || local_parameters.contains(key);
            if !known {
                return Err(ModelError::UnknownLocal {
                    template: name.to_string(),
                    local: key.clone(),
                });
            }
        }

        let species_args: Vec<&str> = variables
            .iter()
            .filter_map(|v| bindings.get(v).map(String::as_str))
            .collect();
        let parameter_args: Vec<&str> = local_parameters
            .iter()
            .filter_map(|p| bindings.get(p).map(String::as_str))
            .collect();

        // Missing keys shorten the lists and surface as an arity mismatch.
        self.add_interaction(name, &species_args, &parameter_args)
    }

    pub fn instances(&self) -> &[InteractionInstance] {
        &self.instances
    }

    pub fn instance(&self, id: InstanceId) -> Option<&InteractionInstance> {
        self.instances.iter().find(|i| i.id() == id)
    }

    pub fn remove_interaction(&mut self, id: InstanceId) -> Option<InteractionInstance> {
        let position = self.instances.iter().position(|i| i.id() == id)?;
        self.touch();
        Some(self.instances.remove(position))
    }

    /// Remove every instance whose variable binding includes any of `ids`.
    pub fn remove_interactions_by_species<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        self.remove_instances_where(|i| ids.iter().any(|id| i.binds_species(id.as_ref())))
    }

    /// Remove every instance of template `name`.
    pub fn remove_interactions_by_name(&mut self, name: &str) -> usize {
        self.remove_instances_where(|i| i.template_id() == name)
    }

    fn remove_instances_where(&mut self, mut pred: impl FnMut(&InteractionInstance) -> bool) -> usize {
        let before = self.instances.len();
        self.instances.retain(|i| !pred(i));
        let removed = before - self.instances.len();
        if removed > 0 {
            self.touch();
        }
        removed
    }

    /// Remove a species and, first, every instance bound to it.
    pub fn remove_species(&mut self, id: &str) -> ModelResult<Species> {
        if !self.species.contains(id) {
            return Err(ModelError::UnknownSpecies { id: id.to_string() });
        }
        let cascaded = self.remove_interactions_by_species(&[id]);
        let species = self
            .species
            .remove(id)
            .ok_or_else(|| ModelError::UnknownSpecies { id: id.to_string() })?;
        info!(species = id, cascaded, "removed species");
        self.touch();
        Ok(species)
    }

    /// Remove a parameter and every instance bound to it.
    pub fn remove_parameter(&mut self, id: &str) -> ModelResult<Parameter> {
        if !self.parameters.contains(id) {
            return Err(ModelError::UnknownParameter { id: id.to_string() });
        }
        let cascaded = self.remove_instances_where(|i| i.binds_parameter(id));
        let parameter = self
            .parameters
            .remove(id)
            .ok_or_else(|| ModelError::UnknownParameter { id: id.to_string() })?;
        info!(parameter = id, cascaded, "removed parameter");
        self.touch();
        Ok(parameter)
    }

    // --- compilation ------------------------------------------------------

    /// Rebuild the model from scratch from the live instance set.
    pub fn compile(&mut self) -> ModelResult<&Model> {
        self.model = None;
        let model = ModelCompiler::compile(
            &mut self.species,
            &self.parameters,
            &self.instances,
            self.revision,
        )?;
        info!(
            species = model.len(),
            parameters = self.parameters.len(),
            instances = self.instances.len(),
            revision = self.revision,
            "compiled model"
        );
        Ok(self.model.insert(model))
    }

    /// Last compiled model, current or not.
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn model_is_current(&self) -> bool {
        self.model
            .as_ref()
            .is_some_and(|m| m.revision() == self.revision)
    }

    /// The compiled model, provided no structural change happened since.
    pub fn current_model(&self) -> ModelResult<&Model> {
        let model = self.model.as_ref().ok_or(ModelError::NotCompiled)?;
        if model.revision() != self.revision {
            return Err(ModelError::ModelOutOfDate {
                compiled: model.revision(),
                current: self.revision,
            });
        }
        Ok(model)
    }

    /// Structural revision counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
