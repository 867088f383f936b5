use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::genotype::Genotype;
use crate::rng::RandomNumberGenerator;

use super::oracle::{EvaluationOracle, SimulationContext};
use super::simulation::{ActorState, Pose, ResultRecord, SimulationConfig};

/// Genes whose sum is the distance walked by [`SumOracle`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Genes(pub Vec<f64>);

impl Genotype for Genes {
    type Body = usize;
    type Controller = Vec<f64>;

    fn mutate(&self, rng: &mut RandomNumberGenerator) -> Self {
        Genes(self.0.iter().map(|g| g + rng.gen_range(-0.5..0.5)).collect())
    }

    fn crossover(&self, other: &Self, rng: &mut RandomNumberGenerator) -> Self {
        Genes(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| if rng.gen_bool(0.5) { *a } else { *b })
                .collect(),
        )
    }

    fn develop(&self) -> (Self::Body, Self::Controller) {
        (self.0.len(), self.0.clone())
    }

    fn is_healthy(&self, state: &ActorState) -> bool {
        state.position[2] >= 0.0
    }
}

/// Walks from the pose to `x = pose.x + sum(genes)`.
///
/// A first gene of `-1000` sinks the actor below the floor, a first gene of
/// `-2000` makes the oracle fail and `-3000` makes it panic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumOracle;

pub const SINK: f64 = -1000.0;
pub const FAIL: f64 = -2000.0;
pub const PANIC: f64 = -3000.0;

impl EvaluationOracle<Genes> for SumOracle {
    fn evaluate(
        &self,
        _body: &usize,
        controller: &mut Vec<f64>,
        config: &SimulationConfig,
        pose: &Pose,
        _context: &SimulationContext,
    ) -> Result<ResultRecord> {
        let first = controller.first().copied().unwrap_or(0.0);
        if first == PANIC {
            panic!("simulator crashed");
        }
        if first == FAIL {
            return Err(OptimizerError::Evaluation("simulator refused".to_string()));
        }
        let z = if first == SINK { -1.0 } else { pose.position[2] };
        let start = ActorState {
            time: 0.0,
            position: pose.position,
            orientation: pose.orientation,
        };
        let end = ActorState {
            time: config.simulation_time as f64,
            position: [
                pose.position[0] + controller.iter().sum::<f64>(),
                pose.position[1],
                z,
            ],
            orientation: pose.orientation,
        };
        Ok(ResultRecord::new(vec![start, end]))
    }
}
