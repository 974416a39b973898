//! Rate-law aggregation and compilation.
//!
//! Every compile is a full rebuild. Terms are summed per target species in
//! instance registration order, left-associated:
//! `((t1 + t2) + t3) + ...`.

use std::collections::HashMap;

use mf_expr::{Evaluator, Expr, ExprResult, Scope};
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::instance::InteractionInstance;
use crate::registry::{Parameter, Registry, Species};

/// Compiled rate law of one species.
#[derive(Debug, Clone)]
pub struct CompiledRateLaw {
    species_id: String,
    expr: Expr,
    evaluator: Evaluator,
    /// Number of instance terms summed into `expr`; zero means the constant-zero law.
    terms: usize,
}

impl CompiledRateLaw {
    pub fn species_id(&self) -> &str {
        &self.species_id
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn terms(&self) -> usize {
        self.terms
    }
}

/// Ordered (species-declaration order) compiled rate laws.
///
/// The evaluation scope is every species id followed by every parameter id,
/// each group in declaration order.
#[derive(Debug, Clone)]
pub struct Model {
    rate_laws: Vec<CompiledRateLaw>,
    scope: Scope,
    parameter_ids: Vec<String>,
    revision: u64,
}

impl Model {
    pub fn len(&self) -> usize {
        self.rate_laws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rate_laws.is_empty()
    }

    pub fn rate_law(&self, index: usize) -> Option<&CompiledRateLaw> {
        self.rate_laws.get(index)
    }

    pub fn rate_laws(&self) -> &[CompiledRateLaw] {
        &self.rate_laws
    }

    pub fn species_ids(&self) -> impl Iterator<Item = &str> {
        self.rate_laws.iter().map(|r| r.species_id())
    }

    pub fn parameter_ids(&self) -> &[String] {
        &self.parameter_ids
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// System revision this model was compiled from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Evaluate every rate law against a full scope vector
    /// (species values then parameter values).
    pub fn evaluate_into(&self, scope_values: &[f64], out: &mut [f64]) -> ExprResult<()> {
        for (slot, law) in out.iter_mut().zip(&self.rate_laws) {
            *slot = law.evaluator.eval(scope_values)?;
        }
        Ok(())
    }

    /// Evaluate every rate law against a name → value map.
    pub fn evaluate_named(&self, vars: &HashMap<String, f64>) -> ExprResult<Vec<f64>> {
        self.rate_laws
            .iter()
            .map(|law| law.evaluator.eval_named(vars))
            .collect()
    }
}

/// Aggregates live instances into per-species rate laws.
pub struct ModelCompiler;

impl ModelCompiler {
    /// Build the aggregated rate-law expression for every species.
    ///
    /// Returns `(expr, term_count)` in species declaration order; species
    /// without contributions get `(None, 0)`.
    pub fn aggregate(
        species: &Registry<Species>,
        instances: &[InteractionInstance],
    ) -> ModelResult<Vec<(Option<Expr>, usize)>> {
        let mut laws: Vec<(Option<Expr>, usize)> = vec![(None, 0); species.len()];

        for instance in instances {
            for (target, term) in instance.substituted() {
                let position = species
                    .position(target)
                    .ok_or_else(|| ModelError::UnknownSpecies { id: target.clone() })?;
                let (law, count) = &mut laws[position];
                *law = Some(match law.take() {
                    None => term.clone(),
                    Some(previous) => Expr::sum(previous, term.clone()),
                });
                *count += 1;
            }
        }

        Ok(laws)
    }

    /// Aggregate, compile and, on success only, store each species' rate law.
    pub fn compile(
        species: &mut Registry<Species>,
        parameters: &Registry<Parameter>,
        instances: &[InteractionInstance],
        revision: u64,
    ) -> ModelResult<Model> {
        for s in species.iter_mut() {
            s.rate_law = None;
        }
        let laws = Self::aggregate(species, instances)?;

        let scope = Scope::new(species.ids().chain(parameters.ids()))?;

        let mut rate_laws = Vec::with_capacity(species.len());
        for (s, (law, terms)) in species.iter().zip(laws) {
            let expr = law.unwrap_or_else(Expr::zero);
            let evaluator = expr.compile(&scope)?;
            debug!(species = %s.id, terms, rate_law = %expr, "compiled rate law");
            rate_laws.push(CompiledRateLaw {
                species_id: s.id.clone(),
                expr,
                evaluator,
                terms,
            });
        }

        for (s, law) in species.iter_mut().zip(&rate_laws) {
            s.rate_law = Some(law.expr.clone());
        }

        Ok(Model {
            rate_laws,
            scope,
            parameter_ids: parameters.ids().map(str::to_string).collect(),
            revision,
        })
    }
}
