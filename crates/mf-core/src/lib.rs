//! mf-core: stable foundation for motif.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers)
//! - ids (compact handles for live interaction instances)
//! - timing (wall-clock timers for compile/solve phases)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;

// Re-exports: nice ergonomics for downstream crates
pub use error::{MfError, MfResult};
pub use ids::*;
pub use numeric::*;
