//! Reusable interaction templates.

use std::collections::HashMap;

use mf_expr::{Expr, parse};

use crate::error::{ModelError, ModelResult};
use crate::registry::Keyed;

/// One additive rate-law term, scoped to a single local variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rule {
    expression: Option<Expr>,
    name: String,
}

impl Rule {
    /// Parse `expr_text` and store it as this rule's term.
    ///
    /// Only syntax is checked; symbols are not resolved until compile.
    pub fn set(&mut self, expr_text: &str, name: impl Into<String>) -> ModelResult<()> {
        let expr = parse(expr_text)?;
        self.set_expr(expr, name);
        Ok(())
    }

    pub fn set_expr(&mut self, expr: Expr, name: impl Into<String>) {
        self.expression = Some(expr);
        self.name = name.into();
    }

    pub fn clear(&mut self) {
        self.expression = None;
    }

    pub fn expression(&self) -> Option<&Expr> {
        self.expression.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named, reusable subsystem: one rule per local variable symbol.
///
/// Local parameters are never declared; they are whatever symbols the rules
/// reference that are not local variables (see [`InteractionTemplate::parameters`]).
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionTemplate {
    id: String,
    variables: Vec<String>,
    rules: HashMap<String, Rule>,
}

impl InteractionTemplate {
    /// Create a template with an empty rule per local variable.
    pub fn new<I, S>(id: impl Into<String>, local_species_ids: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let mut variables = Vec::new();
        let mut rules = HashMap::new();
        for local in local_species_ids {
            let local = local.into();
            if rules.contains_key(&local) {
                return Err(ModelError::DuplicateId {
                    kind: "local variable",
                    id: local,
                });
            }
            rules.insert(local.clone(), Rule::default());
            variables.push(local);
        }
        Ok(Self {
            id,
            variables,
            rules,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Local variable symbols in rule-insertion order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Local parameter symbols, first-seen across rules in declaration order.
    ///
    /// Instance binding is positional against this list, so the order is part
    /// of the template's calling convention.
    pub fn parameters(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (_, rule) in self.rules() {
            let Some(expr) = rule.expression() else {
                continue;
            };
            for sym in expr.symbols() {
                let is_variable = self.variables.iter().any(|v| v == sym);
                if !is_variable && !out.iter().any(|p| p == sym) {
                    out.push(sym.to_string());
                }
            }
        }
        out
    }

    pub fn rule(&self, local: &str) -> Option<&Rule> {
        self.rules.get(local)
    }

    pub fn rule_mut(&mut self, local: &str) -> ModelResult<&mut Rule> {
        self.rules
            .get_mut(local)
            .ok_or_else(|| ModelError::UnknownLocal {
                template: self.id.clone(),
                local: local.to_string(),
            })
    }

    /// Rules paired with their local variable, in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.variables
            .iter()
            .filter_map(|v| self.rules.get(v).map(|r| (v.as_str(), r)))
    }

    /// Convenience for `rule_mut(local)?.set(expr_text, name)`.
    pub fn set_rule(
        &mut self,
        local: &str,
        expr_text: &str,
        name: impl Into<String>,
    ) -> ModelResult<()> {
        self.rule_mut(local)?.set(expr_text, name)
    }
}

impl Keyed for InteractionTemplate {
    fn key(&self) -> &str {
        &self.id
    }
}
