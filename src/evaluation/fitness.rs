//! # Fitness Registry
//!
//! Fitness functions turn a [`ResultRecord`] into the scalar the optimizer
//! ranks by. A run names its fitness function by string; the name is resolved
//! against a [`FitnessRegistry`] once, when the optimizer is constructed, so an
//! unknown name fails before any simulation work starts.
//!
//! ```rust
//! use roboevo::evaluation::{FitnessRegistry, ResultRecord};
//!
//! fn always_one(_: &ResultRecord) -> f64 {
//!     1.0
//! }
//!
//! let registry = FitnessRegistry::with_builtins().register("always_one", always_one);
//! assert!(registry.resolve("displacement").is_ok());
//! assert!(registry.resolve("always_one").is_ok());
//! assert!(registry.resolve("does_not_exist").is_err());
//! ```

use std::collections::BTreeMap;

use crate::error::{OptimizerError, Result};

use super::measures::{
    displacement_measure, forward_x_measure, max_height_relative_to_avg_height_measure,
};
use super::simulation::ResultRecord;

/// Fitness assigned by the builtin functions to invalid runs.
pub const INVALID_FITNESS: f64 = 0.0;

/// A fitness function. Must accept invalid records without panicking.
pub type FitnessFn = fn(&ResultRecord) -> f64;

/// Planar displacement; invalid runs score [`INVALID_FITNESS`].
pub fn displacement_fitness(result: &ResultRecord) -> f64 {
    if !result.valid {
        return INVALID_FITNESS;
    }
    displacement_measure(result)
}

/// Progress along x; invalid runs score [`INVALID_FITNESS`].
pub fn forward_x_fitness(result: &ResultRecord) -> f64 {
    if !result.valid {
        return INVALID_FITNESS;
    }
    forward_x_measure(result)
}

/// Displacement damped by how far the actor rose above its average height.
pub fn displacement_height_fitness(result: &ResultRecord) -> f64 {
    if !result.valid {
        return INVALID_FITNESS;
    }
    let ratio = max_height_relative_to_avg_height_measure(result);
    displacement_measure(result) / ratio.max(1.0)
}

/// A closed mapping from fitness function names to functions.
#[derive(Debug, Clone, Default)]
pub struct FitnessRegistry {
    functions: BTreeMap<String, FitnessFn>,
}

impl FitnessRegistry {
    /// A registry with no functions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding `displacement`, `displacement_height` and `forward_x`.
    pub fn with_builtins() -> Self {
        Self::empty()
            .register("displacement", displacement_fitness)
            .register("displacement_height", displacement_height_fitness)
            .register("forward_x", forward_x_fitness)
    }

    /// Adds `function` under `name`, replacing any previous entry.
    pub fn register(mut self, name: impl Into<String>, function: FitnessFn) -> Self {
        self.functions.insert(name.into(), function);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Looks up `name`.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::Configuration`] listing the known names if
    /// `name` is not registered.
    pub fn resolve(&self, name: &str) -> Result<FitnessFn> {
        self.functions.get(name).copied().ok_or_else(|| {
            OptimizerError::Configuration(format!(
                "Unknown fitness function '{}' (known: {})",
                name,
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}
