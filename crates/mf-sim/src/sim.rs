//! Simulation runner and result recording.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::integrator::{DormandPrince, ForwardEuler, Integrator, RK4};
use crate::model::TransientModel;

/// Fixed-step integrator selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorType {
    /// 4th-order Runge-Kutta (default, 4 rhs calls per step).
    #[default]
    Rk4,
    /// Forward Euler (1st-order, 1 rhs call per step).
    ForwardEuler,
}

/// Step-size policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPolicy {
    Fixed {
        dt: f64,
        #[serde(default)]
        integrator: IntegratorType,
    },
    /// Dormand–Prince 5(4) with error control against `rtol`/`atol`.
    Adaptive {
        initial_dt: f64,
        min_dt: f64,
        max_dt: f64,
    },
}

impl Default for StepPolicy {
    fn default() -> Self {
        StepPolicy::Adaptive {
            initial_dt: 1e-3,
            min_dt: 1e-12,
            max_dt: 1.0,
        }
    }
}

/// Options for simulation runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    pub step: StepPolicy,
    /// Relative tolerance (adaptive stepping only)
    pub rtol: f64,
    /// Absolute tolerance (adaptive stepping only)
    pub atol: f64,
    /// Maximum number of attempted steps (safety limit)
    pub max_steps: usize,
    /// Record every N-th accepted step; the final state is always recorded
    pub record_every: usize,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            step: StepPolicy::default(),
            rtol: 1e-6,
            atol: 1e-9,
            max_steps: 100_000,
            record_every: 1,
        }
    }
}

impl SimOptions {
    pub fn fixed(dt: f64, integrator: IntegratorType) -> Self {
        Self {
            step: StepPolicy::Fixed { dt, integrator },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        match self.step {
            StepPolicy::Fixed { dt, .. } => {
                if !positive(dt) {
                    return Err(SimError::InvalidArg {
                        what: "dt must be positive",
                    });
                }
            }
            StepPolicy::Adaptive {
                initial_dt,
                min_dt,
                max_dt,
            } => {
                if !positive(initial_dt) || !positive(min_dt) || !positive(max_dt) {
                    return Err(SimError::InvalidArg {
                        what: "adaptive step sizes must be positive",
                    });
                }
                if min_dt > max_dt {
                    return Err(SimError::InvalidArg {
                        what: "min_dt must not exceed max_dt",
                    });
                }
            }
        }
        if !positive(self.rtol) || !(self.atol.is_finite() && self.atol >= 0.0) {
            return Err(SimError::InvalidArg {
                what: "tolerances must be finite, rtol positive",
            });
        }
        if self.max_steps == 0 {
            return Err(SimError::InvalidArg {
                what: "max_steps must be positive",
            });
        }
        if self.record_every == 0 {
            return Err(SimError::InvalidArg {
                what: "record_every must be positive",
            });
        }
        Ok(())
    }
}

/// Record of simulation results.
#[derive(Clone, Debug)]
pub struct SimRecord {
    /// Time points, strictly increasing
    pub t: Vec<f64>,
    /// State snapshots, one per time point
    pub x: Vec<DVector<f64>>,
}

impl SimRecord {
    fn start(t0: f64, x0: DVector<f64>) -> Self {
        Self {
            t: vec![t0],
            x: vec![x0],
        }
    }

    fn push(&mut self, t: f64, x: DVector<f64>) {
        self.t.push(t);
        self.x.push(x);
    }

    /// Final state.
    pub fn last(&self) -> Option<&DVector<f64>> {
        self.x.last()
    }
}

/// Integrate `model` over `[t0, tf]` from `x0`.
///
/// The first record is exactly `(t0, x0)` and the last is at exactly `tf`.
/// `t0 == tf` yields that single record without evaluating the model.
pub fn integrate<M: TransientModel>(
    model: &mut M,
    t0: f64,
    tf: f64,
    x0: DVector<f64>,
    opts: &SimOptions,
) -> SimResult<SimRecord> {
    opts.validate()?;
    if !t0.is_finite() || !tf.is_finite() {
        return Err(SimError::InvalidArg {
            what: "time span must be finite",
        });
    }
    if tf < t0 {
        return Err(SimError::InvalidArg {
            what: "tf must not precede t0",
        });
    }
    if x0.len() != model.dim() {
        return Err(SimError::InvalidArg {
            what: "initial state length does not match model",
        });
    }

    let record = SimRecord::start(t0, x0);
    if tf == t0 {
        return Ok(record);
    }

    match opts.step {
        StepPolicy::Fixed { dt, integrator } => match integrator {
            IntegratorType::Rk4 => run_fixed(model, &RK4, t0, tf, dt, opts, record),
            IntegratorType::ForwardEuler => {
                run_fixed(model, &ForwardEuler, t0, tf, dt, opts, record)
            }
        },
        StepPolicy::Adaptive {
            initial_dt,
            min_dt,
            max_dt,
        } => run_adaptive(model, t0, tf, initial_dt, min_dt, max_dt, opts, record),
    }
}

/// Remaining span below this is treated as "arrived".
fn end_slack(t0: f64, tf: f64) -> f64 {
    (tf - t0) * 1e-10
}

fn run_fixed<M: TransientModel, I: Integrator>(
    model: &mut M,
    integrator: &I,
    t0: f64,
    tf: f64,
    dt: f64,
    opts: &SimOptions,
    mut record: SimRecord,
) -> SimResult<SimRecord> {
    let slack = end_slack(t0, tf);
    let mut t = t0;
    let mut x = record.x[0].clone();
    let mut step = 0;

    while tf - t > slack {
        if step >= opts.max_steps {
            return Err(SimError::MaxSteps {
                max_steps: opts.max_steps,
                t_end: tf,
            });
        }
        let h = dt.min(tf - t);
        x = integrator.step(model, t, &x, h)?;
        step += 1;
        t = if tf - (t + h) <= slack { tf } else { t + h };

        if t == tf || step % opts.record_every == 0 {
            record.push(t, x.clone());
        }
    }

    debug!(steps = step, t_end = tf, "fixed-step integration finished");
    Ok(record)
}

#[allow(clippy::too_many_arguments)]
fn run_adaptive<M: TransientModel>(
    model: &mut M,
    t0: f64,
    tf: f64,
    initial_dt: f64,
    min_dt: f64,
    max_dt: f64,
    opts: &SimOptions,
    mut record: SimRecord,
) -> SimResult<SimRecord> {
    const SAFETY: f64 = 0.9;
    const MIN_FACTOR: f64 = 0.2;
    const MAX_FACTOR: f64 = 5.0;

    let slack = end_slack(t0, tf);
    let mut t = t0;
    let mut x = record.x[0].clone();
    let mut h = initial_dt.min(max_dt);
    let mut attempts = 0;
    let mut accepted = 0;
    let mut rejected = 0;

    while tf - t > slack {
        if attempts >= opts.max_steps {
            return Err(SimError::MaxSteps {
                max_steps: opts.max_steps,
                t_end: tf,
            });
        }
        attempts += 1;

        let last_step = h >= tf - t;
        let h_try = if last_step { tf - t } else { h };
        let (x_new, err) = DormandPrince.attempt(model, t, &x, h_try)?;
        let norm = DormandPrince::error_norm(&err, &x, &x_new, opts.rtol, opts.atol);

        let factor = if norm == 0.0 {
            MAX_FACTOR
        } else {
            (SAFETY * norm.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
        };

        if norm.is_finite() && norm <= 1.0 {
            t = if last_step { tf } else { t + h_try };
            x = x_new;
            accepted += 1;
            if t == tf || accepted % opts.record_every == 0 {
                record.push(t, x.clone());
            }
            h = (h_try * factor).min(max_dt);
        } else {
            rejected += 1;
            h = h_try * if norm.is_finite() { factor } else { MIN_FACTOR };
            if h < min_dt {
                return Err(SimError::StepSizeUnderflow { t, dt: h });
            }
        }
        h = h.max(min_dt);
    }

    debug!(accepted, rejected, t_end = tf, "adaptive integration finished");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decay(f64);

    impl TransientModel for Decay {
        fn dim(&self) -> usize {
            1
        }

        fn rhs(&mut self, _t: f64, x: &DVector<f64>) -> SimResult<DVector<f64>> {
            Ok(x * -self.0)
        }
    }

    fn x0() -> DVector<f64> {
        DVector::from_vec(vec![10.0])
    }

    #[test]
    fn sim_options_defaults() {
        let opts = SimOptions::default();
        assert_eq!(opts.rtol, 1e-6);
        assert_eq!(opts.atol, 1e-9);
        assert_eq!(opts.max_steps, 100_000);
        assert_eq!(opts.record_every, 1);
        assert!(matches!(opts.step, StepPolicy::Adaptive { .. }));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn sim_options_invalid() {
        let opts = SimOptions::fixed(0.0, IntegratorType::Rk4);
        assert!(matches!(opts.validate(), Err(SimError::InvalidArg { .. })));

        let opts = SimOptions {
            max_steps: 0,
            ..SimOptions::default()
        };
        assert!(matches!(opts.validate(), Err(SimError::InvalidArg { .. })));
    }

    #[test]
    fn fixed_step_lands_exactly_on_tf() {
        let opts = SimOptions::fixed(0.3, IntegratorType::Rk4);
        let rec = integrate(&mut Decay(0.5), 0.0, 1.0, x0(), &opts).unwrap();
        assert_eq!(rec.t.first(), Some(&0.0));
        assert_eq!(rec.t.last(), Some(&1.0));
        assert_eq!(rec.t.len(), 5);
        assert!(rec.t.windows(2).all(|w| w[0] < w[1]));
        assert!((rec.last().unwrap()[0] - 10.0 * (-0.5_f64).exp()).abs() < 1e-4);
    }

    #[test]
    fn adaptive_meets_tolerance() {
        let rec = integrate(&mut Decay(0.5), 0.0, 1.0, x0(), &SimOptions::default()).unwrap();
        assert_eq!(rec.t.last(), Some(&1.0));
        assert!((rec.last().unwrap()[0] - 6.065_306_597).abs() < 1e-4);
    }

    #[test]
    fn zero_span_is_identity() {
        let rec = integrate(&mut Decay(0.5), 2.0, 2.0, x0(), &SimOptions::default()).unwrap();
        assert_eq!(rec.t, vec![2.0]);
        assert_eq!(rec.x[0], x0());
    }

    #[test]
    fn reversed_span_is_rejected() {
        let err = integrate(&mut Decay(0.5), 1.0, 0.0, x0(), &SimOptions::default()).unwrap_err();
        assert!(matches!(err, SimError::InvalidArg { .. }));
    }

    #[test]
    fn max_steps_aborts() {
        let opts = SimOptions {
            max_steps: 3,
            ..SimOptions::fixed(0.01, IntegratorType::ForwardEuler)
        };
        let err = integrate(&mut Decay(0.5), 0.0, 1.0, x0(), &opts).unwrap_err();
        assert_eq!(
            err,
            SimError::MaxSteps {
                max_steps: 3,
                t_end: 1.0
            }
        );
    }

    #[test]
    fn stiff_problem_underflows_with_large_min_dt() {
        let opts = SimOptions {
            step: StepPolicy::Adaptive {
                initial_dt: 0.5,
                min_dt: 0.1,
                max_dt: 1.0,
            },
            rtol: 1e-12,
            atol: 1e-14,
            ..SimOptions::default()
        };
        let err = integrate(&mut Decay(50.0), 0.0, 1.0, x0(), &opts).unwrap_err();
        assert!(matches!(err, SimError::StepSizeUnderflow { .. }));
    }

    #[test]
    fn step_policy_serde_roundtrip_shape() {
        let json = r#"{"step":{"kind":"fixed","dt":0.01},"max_steps":10}"#;
        let opts: SimOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.step, StepPolicy::Fixed {
            dt: 0.01,
            integrator: IntegratorType::Rk4
        });
        assert_eq!(opts.max_steps, 10);
        assert_eq!(opts.rtol, 1e-6);
    }
}
