//! TransientModel trait for pluggable dynamic systems.

use nalgebra::DVector;

use crate::error::SimResult;

/// A first-order ODE system `dx/dt = f(t, x)` over a flat real state.
pub trait TransientModel {
    /// Number of state entries.
    fn dim(&self) -> usize;

    /// Compute state derivative dxdt = f(t, x).
    ///
    /// Takes `&mut self` so implementations can reuse scratch buffers.
    fn rhs(&mut self, t: f64, x: &DVector<f64>) -> SimResult<DVector<f64>>;
}
