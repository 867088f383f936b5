//! # Evaluation
//!
//! Everything between a genotype and its fitness: the simulator interface
//! ([`EvaluationOracle`]), initial pose selection ([`PoseStrategy`]), the
//! order-preserving batch evaluator ([`BatchEvaluator`]), trajectory measures
//! and the named fitness function registry ([`FitnessRegistry`]).
pub mod dispatcher;
pub mod fitness;
pub mod measures;
pub mod oracle;
pub mod pose;
pub mod simulation;

pub use dispatcher::{BatchEvaluator, EvaluatedBatch};
pub use fitness::{FitnessFn, FitnessRegistry, INVALID_FITNESS};
pub use oracle::{EvaluationOracle, SimulationContext};
pub use pose::{OriginPose, PoseStrategy, StandingPose};
pub use simulation::{ActorState, Pose, ResultRecord, SimulationConfig};

#[cfg(test)]
pub(crate) mod test_support;
