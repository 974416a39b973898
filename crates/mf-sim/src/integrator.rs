//! Single-step time integrators.

use nalgebra::DVector;

use crate::error::SimResult;
use crate::model::TransientModel;

/// Trait for fixed-step time integrators.
pub trait Integrator {
    /// Advance state by one time step using the transient model.
    fn step<M: TransientModel>(
        &self,
        model: &mut M,
        t: f64,
        x: &DVector<f64>,
        dt: f64,
    ) -> SimResult<DVector<f64>>;
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
#[derive(Clone, Debug)]
pub struct RK4;

impl Integrator for RK4 {
    fn step<M: TransientModel>(
        &self,
        model: &mut M,
        t: f64,
        x: &DVector<f64>,
        dt: f64,
    ) -> SimResult<DVector<f64>> {
        let k1 = model.rhs(t, x)?;
        let k2 = model.rhs(t + 0.5 * dt, &(x + &k1 * (0.5 * dt)))?;
        let k3 = model.rhs(t + 0.5 * dt, &(x + &k2 * (0.5 * dt)))?;
        let k4 = model.rhs(t + dt, &(x + &k3 * dt))?;

        // x_new = x + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        Ok(x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0))
    }
}

/// Forward Euler (explicit, 1st order, fast for testing).
/// Calls rhs() once per step instead of 4 times (RK4).
#[derive(Clone, Debug)]
pub struct ForwardEuler;

impl Integrator for ForwardEuler {
    fn step<M: TransientModel>(
        &self,
        model: &mut M,
        t: f64,
        x: &DVector<f64>,
        dt: f64,
    ) -> SimResult<DVector<f64>> {
        let xdot = model.rhs(t, x)?;
        Ok(x + xdot * dt)
    }
}

/// Dormand–Prince 5(4) embedded pair.
///
/// [`DormandPrince::attempt`] returns the 5th-order solution together with
/// the difference to the embedded 4th-order one; step acceptance and
/// step-size control live in [`crate::sim::integrate`].
#[derive(Clone, Debug)]
pub struct DormandPrince;

const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

const A: [[f64; 6]; 7] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];

/// 5th-order weights.
const B5: [f64; 7] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
    0.0,
];

/// B5 minus the embedded 4th-order weights.
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

impl DormandPrince {
    pub fn attempt<M: TransientModel>(
        &self,
        model: &mut M,
        t: f64,
        x: &DVector<f64>,
        dt: f64,
    ) -> SimResult<(DVector<f64>, DVector<f64>)> {
        let mut k: Vec<DVector<f64>> = Vec::with_capacity(7);
        for stage in 0..7 {
            let mut xs = x.clone();
            for (j, kj) in k.iter().enumerate() {
                let a = A[stage][j];
                if a != 0.0 {
                    xs.axpy(dt * a, kj, 1.0);
                }
            }
            k.push(model.rhs(t + C[stage] * dt, &xs)?);
        }

        let mut x_new = x.clone();
        let mut err = DVector::zeros(x.len());
        for (i, ki) in k.iter().enumerate() {
            if B5[i] != 0.0 {
                x_new.axpy(dt * B5[i], ki, 1.0);
            }
            if E[i] != 0.0 {
                err.axpy(dt * E[i], ki, 1.0);
            }
        }
        Ok((x_new, err))
    }

    /// Weighted RMS norm of an error estimate; `<= 1` means acceptable.
    pub fn error_norm(
        err: &DVector<f64>,
        x_old: &DVector<f64>,
        x_new: &DVector<f64>,
        rtol: f64,
        atol: f64,
    ) -> f64 {
        if err.is_empty() {
            return 0.0;
        }
        let sum: f64 = err
            .iter()
            .zip(x_old.iter().zip(x_new.iter()))
            .map(|(e, (a, b))| {
                let scale = atol + rtol * a.abs().max(b.abs());
                (e / scale).powi(2)
            })
            .sum();
        (sum / err.len() as f64).sqrt()
    }
}
