//! # Genotype Trait
//!
//! The `Genotype` trait defines the interface for the evolvable encodings the
//! optimizer works on. The optimizer never looks inside a genotype: it only
//! asks it to mutate, cross over, develop into a simulatable body and
//! controller, and judge whether a simulated state is healthy.
//!
//! Genotypes are persisted with every checkpoint, so they must be
//! serializable with `serde`.
//!
//! ## Example
//!
//! ```rust
//! use roboevo::evaluation::ActorState;
//! use roboevo::genotype::Genotype;
//! use roboevo::rng::RandomNumberGenerator;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct Weights {
//!     weights: Vec<f64>,
//! }
//!
//! impl Genotype for Weights {
//!     type Body = usize;
//!     type Controller = Vec<f64>;
//!
//!     fn mutate(&self, rng: &mut RandomNumberGenerator) -> Self {
//!         let noise = rng.fetch_uniform(-0.1, 0.1, self.weights.len());
//!         Self {
//!             weights: self.weights.iter().zip(noise).map(|(w, n)| w + n as f64).collect(),
//!         }
//!     }
//!
//!     fn crossover(&self, other: &Self, _rng: &mut RandomNumberGenerator) -> Self {
//!         Self {
//!             weights: self.weights.iter().zip(&other.weights).map(|(a, b)| (a + b) / 2.0).collect(),
//!         }
//!     }
//!
//!     fn develop(&self) -> (Self::Body, Self::Controller) {
//!         (self.weights.len(), self.weights.clone())
//!     }
//!
//!     fn is_healthy(&self, state: &ActorState) -> bool {
//!         state.position[2] > -1.0
//!     }
//! }
//! ```

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

use crate::evaluation::ActorState;
use crate::rng::RandomNumberGenerator;

/// Trait for evolvable robot encodings.
///
/// Types implementing this trait must be `Send + Sync` so that batches can be
/// evaluated on worker threads, and serializable so that populations can be
/// checkpointed.
pub trait Genotype: Clone + Debug + Send + Sync + Serialize + DeserializeOwned {
    /// The developed body handed to the simulator.
    type Body: Send;

    /// The controller driving the developed body.
    type Controller: Send;

    /// Returns a mutated copy of this genotype.
    ///
    /// All randomness must come from `rng` so that runs are reproducible and
    /// resumable.
    fn mutate(&self, rng: &mut RandomNumberGenerator) -> Self;

    /// Returns a child combining this genotype with `other`.
    fn crossover(&self, other: &Self, rng: &mut RandomNumberGenerator) -> Self;

    /// Develops the genotype into a simulatable body and its controller.
    fn develop(&self) -> (Self::Body, Self::Controller);

    /// Health check applied to every sampled state of a simulation.
    ///
    /// A single unhealthy state marks the whole run invalid. The default
    /// accepts every state.
    fn is_healthy(&self, _state: &ActorState) -> bool {
        true
    }
}
