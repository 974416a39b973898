//! mf-model: interaction templates, instance binding and rate-law compilation.
//!
//! Provides:
//! - Species and parameter registries (declaration-ordered, id-keyed)
//! - `InteractionTemplate`: reusable local rules over local symbols
//! - `InteractionInstance`: a template bound to global ids with substituted rules
//! - `ModelCompiler`: per-species additive aggregation and compilation into a `Model`
//! - `System`: the caller-owned aggregate that owns all of the above
//!
//! # Example
//!
//! ```
//! use mf_model::System;
//!
//! let mut system = System::new();
//! system.add_species("A", 10.0, "A").unwrap();
//! system.add_parameter("k", 0.5, "decay constant").unwrap();
//! system.define_interaction("decay", ["a"]).unwrap();
//! system.set_rule("decay", "a", "-k*a", "loss").unwrap();
//! system.add_interaction("decay", &["A"], &["k"]).unwrap();
//!
//! let model = system.compile().unwrap();
//! assert_eq!(model.len(), 1);
//! assert_eq!(model.rate_law(0).unwrap().expr().to_string(), "-k * A");
//! ```

pub mod compiler;
pub mod error;
pub mod instance;
pub mod registry;
pub mod system;
pub mod template;

// Re-exports for ergonomics
pub use compiler::{CompiledRateLaw, Model, ModelCompiler};
pub use error::{ModelError, ModelResult};
pub use instance::InteractionInstance;
pub use registry::{Keyed, Parameter, Registry, Species};
pub use system::System;
pub use template::{InteractionTemplate, Rule};
