//! Time integration for compiled motif models.
//!
//! Provides:
//! - Fixed-step RK4 / forward Euler and adaptive Dormand–Prince 5(4) integrators
//! - Batch simulation of a [`mf_model::System`] with continuation write-back
//! - A windowed trajectory buffer (append, trim, concat, perturb)
//! - A tick-paced real-time driver running on one owning worker thread

pub mod buffer;
pub mod driver;
pub mod error;
pub mod integrator;
pub mod model;
pub mod realtime;
pub mod sim;

pub use buffer::{StateBuffer, Trajectory};
pub use driver::{SystemModel, simulate};
pub use error::{SimError, SimResult};
pub use integrator::{DormandPrince, ForwardEuler, Integrator, RK4};
pub use model::TransientModel;
pub use realtime::{
    Perturbation, RealTimeConfig, RealTimeDriver, RealTimeHandle, RealTimeOutcome, TickReport,
};
pub use sim::{IntegratorType, SimOptions, SimRecord, StepPolicy, integrate};
