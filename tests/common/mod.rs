#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use roboevo::error::{OptimizerError, Result};
use roboevo::evaluation::{
    ActorState, EvaluationOracle, OriginPose, Pose, ResultRecord, SimulationConfig,
    SimulationContext,
};
use roboevo::genotype::Genotype;
use roboevo::optimizer::{InitResult, Optimizer, OptimizerBuilder, OptimizerConfig};
use roboevo::rng::RandomNumberGenerator;
use roboevo::store::CheckpointStore;

/// First gene that makes the actor sink through the floor.
pub const SINK: f64 = -1000.0;
/// First gene that makes the simulator fail.
pub const CRASH: f64 = -2000.0;

/// A gait whose genes sum to the distance walked on [`Track`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gait {
    pub genes: Vec<f64>,
}

impl Gait {
    pub fn new(genes: Vec<f64>) -> Self {
        Self { genes }
    }
}

impl Genotype for Gait {
    type Body = usize;
    type Controller = Vec<f64>;

    fn mutate(&self, rng: &mut RandomNumberGenerator) -> Self {
        Gait::new(
            self.genes
                .iter()
                .map(|g| g + rng.gen_range(-0.25..0.25))
                .collect(),
        )
    }

    fn crossover(&self, other: &Self, rng: &mut RandomNumberGenerator) -> Self {
        let cut = rng.gen_index(self.genes.len().max(1));
        Gait::new(
            self.genes
                .iter()
                .zip(&other.genes)
                .enumerate()
                .map(|(i, (a, b))| if i < cut { *a } else { *b })
                .collect(),
        )
    }

    fn develop(&self) -> (usize, Vec<f64>) {
        (self.genes.len(), self.genes.clone())
    }

    fn is_healthy(&self, state: &ActorState) -> bool {
        state.position[2] >= 0.0
    }
}

/// Stub simulator: walks in a straight line along x.
#[derive(Clone, Debug, Default)]
pub struct Track {
    pub calls: Arc<AtomicUsize>,
    /// Sleep `(10 - first gene)` milliseconds per evaluation, so that early
    /// genotypes in a batch finish last.
    pub sleepy: bool,
}

impl Track {
    pub fn sleepy() -> Self {
        Self {
            sleepy: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EvaluationOracle<Gait> for Track {
    fn evaluate(
        &self,
        _body: &usize,
        controller: &mut Vec<f64>,
        config: &SimulationConfig,
        pose: &Pose,
        _context: &SimulationContext,
    ) -> Result<ResultRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let first = controller.first().copied().unwrap_or(0.0);
        if self.sleepy {
            let millis = (10.0 - first).clamp(0.0, 10.0) as u64;
            thread::sleep(Duration::from_millis(millis));
        }
        if first == CRASH {
            return Err(OptimizerError::Evaluation("simulator crashed".to_string()));
        }

        let samples = config.simulation_time as usize;
        let distance: f64 = controller.iter().sum();
        let sink = first == SINK;
        let states = (0..=samples)
            .map(|step| {
                let progress = step as f64 / samples as f64;
                ActorState {
                    time: step as f64,
                    position: [
                        pose.position[0] + distance * progress,
                        pose.position[1],
                        if sink && step == samples { -1.0 } else { 0.1 },
                    ],
                    orientation: pose.orientation,
                }
            })
            .collect();
        Ok(ResultRecord::new(states))
    }
}

/// Routes optimizer logs to the test harness's captured output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub type TestOptimizer<S> = Optimizer<Gait, S, Track, OriginPose>;

pub fn config(num_generations: u64) -> OptimizerConfig {
    OptimizerConfig::builder()
        .seed(420)
        .population_size(6)
        .offspring_size(6)
        .num_generations(num_generations)
        .simulation(SimulationConfig {
            simulation_time: 5,
            ..SimulationConfig::default()
        })
        .fitness_function("forward_x")
        .body_name("gait")
        .build()
        .unwrap()
}

pub fn initial_population(size: usize) -> Vec<Gait> {
    (0..size)
        .map(|i| Gait::new(vec![i as f64 * 0.5, 1.0, -0.5]))
        .collect()
}

pub fn builder<S: CheckpointStore>(
    config: OptimizerConfig,
    store: S,
    oracle: Track,
) -> OptimizerBuilder<Gait, S, Track, OriginPose> {
    OptimizerBuilder::new(config)
        .with_store(store)
        .with_oracle(oracle)
        .with_pose_strategy(OriginPose)
}

/// Starts a fresh run of `process_id`, panicking if a checkpoint exists.
pub fn start<S: CheckpointStore>(
    config: OptimizerConfig,
    store: S,
    process_id: u64,
) -> TestOptimizer<S> {
    let size = config.population_size();
    match builder(config, store, Track::default())
        .with_initial_population(initial_population(size))
        .initialize(process_id)
        .unwrap()
    {
        InitResult::Fresh(optimizer) => optimizer,
        InitResult::Resumed(_) => panic!("Expected a fresh run, found a checkpoint"),
        InitResult::NotFound => panic!("Expected a fresh run"),
    }
}

/// Resumes `process_id`, panicking if it has no checkpoint.
pub fn resume<S: CheckpointStore>(
    config: OptimizerConfig,
    store: S,
    process_id: u64,
) -> TestOptimizer<S> {
    match builder(config, store, Track::default())
        .initialize(process_id)
        .unwrap()
    {
        InitResult::Resumed(optimizer) => optimizer,
        _ => panic!("Expected a resumed run"),
    }
}

/// Genotype JSON, fitness, id and parents of every stored generation.
pub fn stored_generations<S: CheckpointStore>(
    store: &S,
    process_id: u64,
) -> Vec<Vec<(String, Option<u64>, u64, Vec<u64>)>> {
    store
        .generations(process_id)
        .unwrap()
        .into_iter()
        .map(|g| {
            store
                .individuals(process_id, g)
                .unwrap()
                .into_iter()
                .map(|r| {
                    (
                        r.genotype,
                        r.fitness.map(f64::to_bits),
                        r.individual_id,
                        r.parent_ids,
                    )
                })
                .collect()
        })
        .collect()
}
