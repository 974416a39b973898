//! Model file schema definitions.

use std::collections::BTreeMap;

use mf_sim::{RealTimeConfig, SimOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelFile {
    pub version: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub species: Vec<SpeciesDef>,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub templates: Vec<TemplateDef>,
    #[serde(default)]
    pub interactions: Vec<InteractionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime: Option<RealTimeConfig>,
}

impl ModelFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: crate::migrate::LATEST_VERSION,
            name: name.into(),
            description: None,
            species: Vec::new(),
            parameters: Vec::new(),
            templates: Vec::new(),
            interactions: Vec::new(),
            simulation: None,
            realtime: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeciesDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub initial_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateDef {
    pub id: String,
    /// Local variable symbols; their order is the positional binding order.
    pub variables: Vec<String>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleDef {
    pub variable: String,
    pub expression: String,
    #[serde(default)]
    pub name: String,
}

/// One template instantiation, bound either positionally
/// (`species` + `parameters`) or by local symbol (`bindings`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionDef {
    pub template: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub species: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<String, String>,
}

impl InteractionDef {
    pub fn positional(
        template: impl Into<String>,
        species: &[&str],
        parameters: &[&str],
    ) -> Self {
        Self {
            template: template.into(),
            species: species.iter().map(|s| s.to_string()).collect(),
            parameters: parameters.iter().map(|s| s.to_string()).collect(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn is_named(&self) -> bool {
        !self.bindings.is_empty()
    }
}

/// Default batch run settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationDef {
    #[serde(default)]
    pub t0: f64,
    pub tf: f64,
    #[serde(default)]
    pub options: SimOptions,
}
