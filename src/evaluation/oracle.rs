use crate::error::Result;
use crate::genotype::Genotype;

use super::simulation::{Pose, ResultRecord, SimulationConfig};

/// Per-evaluation simulator settings that are not part of the run's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationContext {
    /// Whether the simulator should run without a viewer.
    pub headless: bool,
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self { headless: true }
    }
}

/// The external simulator.
///
/// Implementations may be slow and are invoked from worker threads when the
/// batch evaluator runs with more than one job, so they must not share mutable
/// simulator state between calls. Returning an error (or panicking) marks only
/// that genotype's result invalid.
pub trait EvaluationOracle<G: Genotype>: Send + Sync {
    fn evaluate(
        &self,
        body: &G::Body,
        controller: &mut G::Controller,
        config: &SimulationConfig,
        pose: &Pose,
        context: &SimulationContext,
    ) -> Result<ResultRecord>;
}
