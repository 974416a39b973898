//! Batch simulation of a compiled [`System`].

use mf_model::{Model, System};
use nalgebra::DVector;
use tracing::{debug, info};

use crate::buffer::Trajectory;
use crate::error::{SimError, SimResult};
use crate::model::TransientModel;
use crate::sim::{SimOptions, SimRecord, integrate};

/// Adapts a compiled [`Model`] to the integrator.
///
/// The evaluation scope is the state vector followed by a snapshot of the
/// parameter values taken at construction.
pub struct SystemModel<'a> {
    model: &'a Model,
    scope: Vec<f64>,
    species: usize,
}

impl<'a> SystemModel<'a> {
    pub fn new(model: &'a Model, parameters: &[f64]) -> SimResult<Self> {
        if parameters.len() != model.parameter_ids().len() {
            return Err(SimError::InvalidArg {
                what: "parameter vector does not match compiled model",
            });
        }
        let species = model.len();
        let mut scope = vec![0.0; species];
        scope.extend_from_slice(parameters);
        Ok(Self {
            model,
            scope,
            species,
        })
    }

    /// Build from the system's current model and parameter values.
    pub fn from_system(system: &'a System) -> SimResult<Self> {
        let model = system.current_model()?;
        Self::new(model, &system.parameter_vector())
    }
}

impl TransientModel for SystemModel<'_> {
    fn dim(&self) -> usize {
        self.species
    }

    fn rhs(&mut self, t: f64, x: &DVector<f64>) -> SimResult<DVector<f64>> {
        self.scope[..self.species].copy_from_slice(x.as_slice());
        let mut dxdt = DVector::zeros(self.species);
        self.model
            .evaluate_into(&self.scope, dxdt.as_mut_slice())?;
        if let Some(i) = dxdt.iter().position(|v| !v.is_finite()) {
            let species = self
                .model
                .rate_law(i)
                .map(|law| law.species_id().to_string())
                .unwrap_or_default();
            return Err(SimError::NonFinite { species, t });
        }
        Ok(dxdt)
    }
}

/// Integrate `system` from its current values over `[t0, tf]`.
///
/// On success each species' `value` is set to the last sample of its
/// trajectory. On failure the system is left untouched.
pub fn simulate(
    system: &mut System,
    t0: f64,
    tf: f64,
    opts: &SimOptions,
) -> SimResult<Trajectory> {
    if tf < t0 {
        return Err(SimError::InvalidArg {
            what: "tf must not precede t0",
        });
    }

    let record = run(system, t0, tf, opts)?;
    ensure_finite_record(system, &record, 0.0)?;
    let trajectory = Trajectory::from_record(system.species().ids(), &record)?;

    if let Some(last) = record.last() {
        system.write_back(last.as_slice())?;
    }
    info!(
        t0,
        tf,
        samples = trajectory.len(),
        species = system.species().len(),
        "simulation finished"
    );
    Ok(trajectory)
}

fn run(system: &System, t0: f64, tf: f64, opts: &SimOptions) -> SimResult<SimRecord> {
    let mut model = SystemModel::from_system(system)?;
    let x0 = DVector::from_vec(system.state_vector());
    debug!(t0, tf, species = model.dim(), "integrating system");
    integrate(&mut model, t0, tf, x0, opts)
}

/// Reject a record that holds a non-finite state, naming the first species
/// affected. `t_offset` is added to the reported time.
pub(crate) fn ensure_finite_record(
    system: &System,
    record: &SimRecord,
    t_offset: f64,
) -> SimResult<()> {
    for (t, x) in record.t.iter().zip(&record.x) {
        if let Some(i) = x.iter().position(|v| !v.is_finite()) {
            let species = system
                .species()
                .as_slice()
                .get(i)
                .map(|s| s.id.clone())
                .unwrap_or_default();
            return Err(SimError::NonFinite {
                species,
                t: t_offset + t,
            });
        }
    }
    Ok(())
}

/// Integrate from an explicit start vector without writing anything back.
pub(crate) fn integrate_from(
    system: &System,
    x0: Vec<f64>,
    t_end: f64,
    opts: &SimOptions,
) -> SimResult<SimRecord> {
    let mut model = SystemModel::from_system(system)?;
    integrate(&mut model, 0.0, t_end, DVector::from_vec(x0), opts)
}
