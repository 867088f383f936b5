//! # Optimizer
//!
//! The generational loop. Each generation is evaluated as one batch, then the
//! optimizer's complete state (population, fitness, lineage and the random
//! number generator) is appended to a [`CheckpointStore`] before the next
//! generation is bred. A run interrupted at any point can therefore be resumed
//! from its last checkpoint and produces exactly the populations an
//! uninterrupted run would have produced.
//!
//! Breeding draws two parents per child by tournament, crosses them over and
//! mutates the result. Survivors are the best `population_size` individuals
//! of the current population and its offspring.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use roboevo::error::Result;
//! use roboevo::evaluation::{
//!     ActorState, EvaluationOracle, OriginPose, Pose, ResultRecord, SimulationConfig,
//!     SimulationContext,
//! };
//! use roboevo::genotype::Genotype;
//! use roboevo::optimizer::{InitResult, OptimizerBuilder, OptimizerConfig, RunOutcome};
//! use roboevo::rng::RandomNumberGenerator;
//! use roboevo::store::MemoryStore;
//! use rand::Rng;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct Stride(f64);
//!
//! impl Genotype for Stride {
//!     type Body = ();
//!     type Controller = f64;
//!
//!     fn mutate(&self, rng: &mut RandomNumberGenerator) -> Self {
//!         Stride(self.0 + rng.gen_range(-0.1..0.1))
//!     }
//!
//!     fn crossover(&self, other: &Self, _rng: &mut RandomNumberGenerator) -> Self {
//!         Stride((self.0 + other.0) / 2.0)
//!     }
//!
//!     fn develop(&self) -> ((), f64) {
//!         ((), self.0)
//!     }
//! }
//!
//! struct Treadmill;
//!
//! impl EvaluationOracle<Stride> for Treadmill {
//!     fn evaluate(
//!         &self,
//!         _body: &(),
//!         stride: &mut f64,
//!         config: &SimulationConfig,
//!         pose: &Pose,
//!         _context: &SimulationContext,
//!     ) -> Result<ResultRecord> {
//!         let at = |time: f64, x: f64| ActorState {
//!             time,
//!             position: [x, 0.0, 0.0],
//!             orientation: pose.orientation,
//!         };
//!         let time = config.simulation_time as f64;
//!         Ok(ResultRecord::new(vec![at(0.0, 0.0), at(time, *stride * time)]))
//!     }
//! }
//!
//! let config = OptimizerConfig::builder()
//!     .population_size(4)
//!     .offspring_size(4)
//!     .num_generations(3)
//!     .fitness_function("forward_x")
//!     .body_name("stride")
//!     .build()?;
//!
//! let store = Arc::new(MemoryStore::new());
//! let init = OptimizerBuilder::new(config)
//!     .with_store(store.clone())
//!     .with_oracle(Treadmill)
//!     .with_pose_strategy(OriginPose)
//!     .with_initial_population((0..4).map(|i| Stride(i as f64 * 0.1)).collect())
//!     .initialize(1)?;
//!
//! let InitResult::Fresh(mut optimizer) = init else {
//!     panic!("expected a fresh run");
//! };
//! let outcome = optimizer.run()?;
//!
//! assert_eq!(outcome, RunOutcome::Completed { generation_index: 3 });
//! assert_eq!(optimizer.population().len(), 4);
//! # Ok::<(), roboevo::error::OptimizerError>(())
//! ```

pub mod config;
pub mod state;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{OptimizerError, Result};
use crate::evaluation::{
    BatchEvaluator, EvaluatedBatch, EvaluationOracle, FitnessFn, FitnessRegistry, PoseStrategy,
    ResultRecord,
};
use crate::genotype::Genotype;
use crate::rng::{RandomNumberGenerator, RngState};
use crate::selection::{ElitistSelection, SelectionStrategy, TournamentSelection};
use crate::store::{CheckpointStore, GenerationCheckpoint};
use crate::telemetry::TelemetrySink;

pub use config::{OptimizerConfig, OptimizerConfigBuilder};
pub use state::{Individual, OptimizerState};

/// Where the generational loop currently is.
///
/// `Evaluating` and `Checkpointing` are only observed after a step failed
/// part way; such an optimizer refuses to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Fresh start; generation 0 has not been evaluated yet.
    Initialized,
    Evaluating,
    Checkpointing,
    /// The latest generation is checkpointed and the next one may be bred.
    Advancing,
    /// The last generation is checkpointed.
    Terminated,
}

/// How [`Optimizer::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every generation up to `num_generations` is checkpointed.
    Completed { generation_index: u64 },
    /// A stop was requested; `generation_index` is the last checkpointed generation.
    Stopped { generation_index: u64 },
}

/// Requests a graceful stop of a running optimizer from another thread.
///
/// The request is honored after the next checkpoint, so a stopped run can
/// always be resumed.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Result of [`OptimizerBuilder::initialize`].
pub enum InitResult<G, S, O, P>
where
    G: Genotype,
    S: CheckpointStore,
    O: EvaluationOracle<G>,
    P: PoseStrategy<G::Body>,
{
    /// No checkpoint existed; a new run starts from the initial population.
    Fresh(Optimizer<G, S, O, P>),
    /// The run continues from its latest checkpoint.
    Resumed(Optimizer<G, S, O, P>),
    /// No checkpoint existed and no initial population was given.
    NotFound,
}

impl<G, S, O, P> InitResult<G, S, O, P>
where
    G: Genotype,
    S: CheckpointStore,
    O: EvaluationOracle<G>,
    P: PoseStrategy<G::Body>,
{
    pub fn is_fresh(&self) -> bool {
        matches!(self, InitResult::Fresh(_))
    }

    pub fn is_resumed(&self) -> bool {
        matches!(self, InitResult::Resumed(_))
    }

    /// The optimizer, whether fresh or resumed.
    pub fn into_optimizer(self) -> Option<Optimizer<G, S, O, P>> {
        match self {
            InitResult::Fresh(optimizer) | InitResult::Resumed(optimizer) => Some(optimizer),
            InitResult::NotFound => None,
        }
    }
}

/// Collects the collaborators of an [`Optimizer`] and decides between
/// resuming and starting fresh.
pub struct OptimizerBuilder<G, S, O, P>
where
    G: Genotype,
    S: CheckpointStore,
    O: EvaluationOracle<G>,
    P: PoseStrategy<G::Body>,
{
    config: OptimizerConfig,
    store: Option<S>,
    oracle: Option<O>,
    pose_strategy: Option<P>,
    registry: FitnessRegistry,
    telemetry: Option<Box<dyn TelemetrySink>>,
    initial_population: Option<Vec<G>>,
    stop: StopHandle,
}

impl<G, S, O, P> OptimizerBuilder<G, S, O, P>
where
    G: Genotype,
    S: CheckpointStore,
    O: EvaluationOracle<G>,
    P: PoseStrategy<G::Body>,
{
    /// Creates a builder with the builtin fitness functions and no telemetry.
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            store: None,
            oracle: None,
            pose_strategy: None,
            registry: FitnessRegistry::with_builtins(),
            telemetry: None,
            initial_population: None,
            stop: StopHandle::new(),
        }
    }

    pub fn with_store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_oracle(mut self, oracle: O) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_pose_strategy(mut self, pose_strategy: P) -> Self {
        self.pose_strategy = Some(pose_strategy);
        self
    }

    pub fn with_fitness_registry(mut self, registry: FitnessRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_telemetry(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.telemetry = Some(Box::new(sink));
        self
    }

    /// Population used if no checkpoint exists. Ignored when resuming.
    pub fn with_initial_population(mut self, population: Vec<G>) -> Self {
        self.initial_population = Some(population);
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Resumes `process_id` from its latest checkpoint, or starts it fresh
    /// from the initial population if it has none.
    ///
    /// No evaluation happens here. A fresh start writes nothing to the store
    /// until generation 0 has been evaluated by [`Optimizer::run`].
    ///
    /// # Errors
    ///
    /// - [`OptimizerError::Configuration`] if the fitness function is unknown,
    ///   a collaborator is missing, or the initial population is empty or of
    ///   the wrong size.
    /// - [`OptimizerError::IncompatibleState`] if the stored checkpoint does
    ///   not match the configuration or is corrupt.
    /// - [`OptimizerError::Storage`] if the store cannot be read.
    pub fn initialize(self, process_id: u64) -> Result<InitResult<G, S, O, P>> {
        let fitness_fn = self.registry.resolve(self.config.fitness_function())?;
        let store = self
            .store
            .ok_or_else(|| OptimizerError::Configuration("Checkpoint store is required".into()))?;
        let oracle = self
            .oracle
            .ok_or_else(|| OptimizerError::Configuration("Evaluation oracle is required".into()))?;
        let pose_strategy = self
            .pose_strategy
            .ok_or_else(|| OptimizerError::Configuration("Pose strategy is required".into()))?;
        let parent_selection = TournamentSelection::new(self.config.tournament_size())?;

        let parts = Parts {
            store,
            oracle,
            pose_strategy,
            fitness_fn,
            telemetry: self.telemetry,
            stop: self.stop,
            parent_selection,
        };

        if let Some(latest) = parts.store.latest(process_id)? {
            let optimizer = Optimizer::resume(process_id, self.config, latest, parts)?;
            return Ok(InitResult::Resumed(optimizer));
        }

        if parts.store.has_individuals(process_id)? {
            return Err(OptimizerError::IncompatibleState(format!(
                "Process {} has stored individuals but no optimizer state",
                process_id
            )));
        }

        match self.initial_population {
            Some(population) => {
                let optimizer = Optimizer::fresh(process_id, self.config, population, parts)?;
                Ok(InitResult::Fresh(optimizer))
            }
            None => {
                info!(process_id, "No checkpoint found and no initial population given");
                Ok(InitResult::NotFound)
            }
        }
    }
}

struct Parts<S, O, P> {
    store: S,
    oracle: O,
    pose_strategy: P,
    fitness_fn: FitnessFn,
    telemetry: Option<Box<dyn TelemetrySink>>,
    stop: StopHandle,
    parent_selection: TournamentSelection,
}

/// A checkpointing generational optimizer for one process id.
pub struct Optimizer<G, S, O, P>
where
    G: Genotype,
    S: CheckpointStore,
    O: EvaluationOracle<G>,
    P: PoseStrategy<G::Body>,
{
    process_id: u64,
    config: OptimizerConfig,
    store: S,
    evaluator: BatchEvaluator<G, O, P>,
    fitness_fn: FitnessFn,
    telemetry: Option<Box<dyn TelemetrySink>>,
    stop: StopHandle,
    parent_selection: TournamentSelection,
    survivor_selection: ElitistSelection,
    rng: RandomNumberGenerator,
    population: Vec<Individual<G>>,
    latest_batch: EvaluatedBatch,
    generation_index: u64,
    next_individual_id: u64,
    phase: LoopPhase,
}

impl<G, S, O, P> Optimizer<G, S, O, P>
where
    G: Genotype,
    S: CheckpointStore,
    O: EvaluationOracle<G>,
    P: PoseStrategy<G::Body>,
{
    fn fresh(
        process_id: u64,
        config: OptimizerConfig,
        genotypes: Vec<G>,
        parts: Parts<S, O, P>,
    ) -> Result<Self> {
        if genotypes.is_empty() {
            return Err(OptimizerError::Configuration(
                "Initial population cannot be empty".to_string(),
            ));
        }
        if genotypes.len() != config.population_size() {
            return Err(OptimizerError::Configuration(format!(
                "Initial population has {} individuals, expected {}",
                genotypes.len(),
                config.population_size()
            )));
        }

        let population: Vec<Individual<G>> = genotypes
            .into_iter()
            .zip(0u64..)
            .map(|(genotype, id)| Individual::new(id, genotype, Vec::new()))
            .collect();
        let next_individual_id = population.len() as u64;
        let rng = RandomNumberGenerator::from_seed(config.seed());

        info!(
            process_id,
            seed = config.seed(),
            population_size = config.population_size(),
            num_generations = config.num_generations(),
            "Starting new optimization"
        );

        Self::assemble(
            process_id,
            config,
            parts,
            rng,
            population,
            0,
            next_individual_id,
            LoopPhase::Initialized,
        )
    }

    fn resume(
        process_id: u64,
        config: OptimizerConfig,
        latest: OptimizerState,
        parts: Parts<S, O, P>,
    ) -> Result<Self> {
        latest.ensure_matches(&config)?;
        let config = if latest.num_generations != config.num_generations() {
            info!(
                stored = latest.num_generations,
                configured = config.num_generations(),
                "Using the stored number of generations"
            );
            config.with_num_generations(latest.num_generations)
        } else {
            config
        };

        let records = parts.store.individuals(process_id, latest.generation_index)?;
        if records.len() != latest.population_size {
            return Err(OptimizerError::IncompatibleState(format!(
                "Process {} generation {} has {} stored individuals, expected {}",
                process_id,
                latest.generation_index,
                records.len(),
                latest.population_size
            )));
        }
        let population = records
            .iter()
            .map(Individual::from_record)
            .collect::<Result<Vec<Individual<G>>>>()?;
        let next_individual_id = latest.next_individual_id;
        if let Some(taken) = population.iter().find(|i| i.id >= next_individual_id) {
            return Err(OptimizerError::IncompatibleState(format!(
                "Process {} generation {} stores individual {} but hands out id {} next",
                process_id, latest.generation_index, taken.id, next_individual_id
            )));
        }

        let rng = RandomNumberGenerator::restore(&latest.rng_state).map_err(|e| {
            OptimizerError::IncompatibleState(format!(
                "Stored random number generator state cannot be restored: {}",
                e
            ))
        })?;
        let phase = if latest.is_final() {
            LoopPhase::Terminated
        } else {
            LoopPhase::Advancing
        };

        info!(
            process_id,
            generation_index = latest.generation_index,
            num_generations = latest.num_generations,
            "Resuming optimization"
        );

        let mut optimizer = Self::assemble(
            process_id,
            config,
            parts,
            rng,
            population,
            latest.generation_index,
            next_individual_id,
            phase,
        )?;
        optimizer.latest_batch = EvaluatedBatch {
            fitness: optimizer.population_fitness(),
            results: Vec::new(),
        };
        Ok(optimizer)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        process_id: u64,
        config: OptimizerConfig,
        parts: Parts<S, O, P>,
        rng: RandomNumberGenerator,
        population: Vec<Individual<G>>,
        generation_index: u64,
        next_individual_id: u64,
        phase: LoopPhase,
    ) -> Result<Self> {
        let evaluator = BatchEvaluator::new(
            parts.oracle,
            parts.pose_strategy,
            *config.simulation(),
            config.n_jobs(),
            config.headless(),
        )?;

        Ok(Self {
            process_id,
            config,
            store: parts.store,
            evaluator,
            fitness_fn: parts.fitness_fn,
            telemetry: parts.telemetry,
            stop: parts.stop,
            parent_selection: parts.parent_selection,
            survivor_selection: ElitistSelection,
            rng,
            population,
            latest_batch: EvaluatedBatch::default(),
            generation_index,
            next_individual_id,
            phase,
        })
    }

    /// Runs generations until the last one is checkpointed or a stop is requested.
    ///
    /// # Errors
    ///
    /// Storage failures abort the run. Everything checkpointed before the
    /// failure stays valid, so the run can be resumed.
    pub fn run(&mut self) -> Result<RunOutcome> {
        info!(
            process_id = self.process_id,
            generation_index = self.generation_index,
            num_generations = self.config.num_generations(),
            "Running optimization"
        );

        loop {
            match self.phase {
                LoopPhase::Terminated => {
                    info!(
                        process_id = self.process_id,
                        generation_index = self.generation_index,
                        "Optimization finished"
                    );
                    return Ok(RunOutcome::Completed {
                        generation_index: self.generation_index,
                    });
                }
                LoopPhase::Advancing if self.stop.is_stop_requested() => {
                    info!(
                        process_id = self.process_id,
                        generation_index = self.generation_index,
                        "Optimization stopped on request"
                    );
                    return Ok(RunOutcome::Stopped {
                        generation_index: self.generation_index,
                    });
                }
                _ => self.step()?,
            }
        }
    }

    /// Evaluates and checkpoints one generation.
    ///
    /// On a fresh optimizer this is generation 0; otherwise the next
    /// generation is bred first. Does nothing once terminated.
    pub fn step(&mut self) -> Result<()> {
        match self.phase {
            LoopPhase::Initialized => self.evaluate_initial_population(),
            LoopPhase::Advancing => self.advance()?,
            LoopPhase::Terminated => return Ok(()),
            LoopPhase::Evaluating | LoopPhase::Checkpointing => {
                return Err(OptimizerError::IncompatibleState(format!(
                    "Process {} cannot continue after a failed step in generation {}",
                    self.process_id, self.generation_index
                )));
            }
        }

        self.phase = LoopPhase::Checkpointing;
        self.checkpoint()?;
        self.phase = if self.generation_index >= self.config.num_generations() {
            LoopPhase::Terminated
        } else {
            LoopPhase::Advancing
        };
        Ok(())
    }

    fn evaluate_initial_population(&mut self) {
        self.phase = LoopPhase::Evaluating;
        let genotypes: Vec<G> = self.population.iter().map(|i| i.genotype.clone()).collect();
        let batch = self.evaluator.evaluate_with_fitness(&genotypes, self.fitness_fn);
        for (individual, fitness) in self.population.iter_mut().zip(&batch.fitness) {
            individual.fitness = Some(*fitness);
        }
        self.latest_batch = batch;
        self.report_telemetry();
    }

    fn advance(&mut self) -> Result<()> {
        let offspring_size = self.config.offspring_size();
        let fitness = self.population_fitness();
        let parent_indices =
            self.parent_selection
                .select(&fitness, 2 * offspring_size, &mut self.rng)?;

        let mut offspring = Vec::with_capacity(offspring_size);
        for pair in parent_indices.chunks_exact(2) {
            let first = &self.population[pair[0]];
            let second = &self.population[pair[1]];
            let genotype = first
                .genotype
                .crossover(&second.genotype, &mut self.rng)
                .mutate(&mut self.rng);
            let id = self.next_individual_id;
            self.next_individual_id += 1;
            offspring.push(Individual::new(id, genotype, vec![first.id, second.id]));
        }
        debug!(offspring = offspring.len(), "Bred offspring");

        self.phase = LoopPhase::Evaluating;
        let genotypes: Vec<G> = offspring.iter().map(|i| i.genotype.clone()).collect();
        let batch = self.evaluator.evaluate_with_fitness(&genotypes, self.fitness_fn);
        for (individual, fitness) in offspring.iter_mut().zip(&batch.fitness) {
            individual.fitness = Some(*fitness);
        }

        let mut candidates = std::mem::take(&mut self.population);
        candidates.extend(offspring);
        let candidate_fitness: Vec<f64> = candidates
            .iter()
            .map(|i| i.fitness.unwrap_or(f64::NAN))
            .collect();
        let survivors = self.survivor_selection.select(
            &candidate_fitness,
            self.config.population_size(),
            &mut self.rng,
        )?;

        let mut candidates: Vec<Option<Individual<G>>> =
            candidates.into_iter().map(Some).collect();
        self.population = survivors
            .iter()
            .filter_map(|&index| candidates[index].take())
            .collect();

        self.generation_index += 1;
        self.latest_batch = batch;
        self.report_telemetry();
        Ok(())
    }

    fn checkpoint(&mut self) -> Result<()> {
        let state = OptimizerState::capture(
            self.process_id,
            self.generation_index,
            self.rng.snapshot(),
            self.next_individual_id,
            &self.config,
        );
        let individuals = self
            .population
            .iter()
            .enumerate()
            .map(|(ordinal, individual)| individual.to_record(ordinal))
            .collect::<Result<Vec<_>>>()?;

        self.store.append(&GenerationCheckpoint { state, individuals })?;
        info!(
            process_id = self.process_id,
            generation_index = self.generation_index,
            best_fitness = self.best_fitness(),
            "Generation checkpointed"
        );
        Ok(())
    }

    fn report_telemetry(&mut self) {
        let Some(sink) = self.telemetry.as_mut() else {
            return;
        };
        let generation_index = self.generation_index;
        let batch = &self.latest_batch;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            sink.report(generation_index, &batch.fitness, &batch.results)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(generation_index, error = %err, "Telemetry report failed"),
            Err(_) => warn!(generation_index, "Telemetry sink panicked"),
        }
    }

    fn population_fitness(&self) -> Vec<f64> {
        self.population
            .iter()
            .map(|i| i.fitness.unwrap_or(f64::NAN))
            .collect()
    }

    fn best_fitness(&self) -> f64 {
        self.population
            .iter()
            .filter_map(|i| i.fitness)
            .filter(|f| !f.is_nan())
            .fold(f64::NAN, f64::max)
    }

    pub fn process_id(&self) -> u64 {
        self.process_id
    }

    /// Index of the latest evaluated generation.
    pub fn generation_index(&self) -> u64 {
        self.generation_index
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// The configuration in effect. A resumed run carries the stored number of generations.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// The current population, best first once the first offspring were selected.
    pub fn population(&self) -> &[Individual<G>] {
        &self.population
    }

    /// Fitness of the most recently evaluated batch, in batch order.
    ///
    /// Right after a resume this is the fitness of the restored population.
    pub fn latest_fitness(&self) -> &[f64] {
        &self.latest_batch.fitness
    }

    /// Result records of the most recently evaluated batch; empty right after a resume.
    pub fn latest_results(&self) -> &[ResultRecord] {
        &self.latest_batch.results
    }

    pub fn rng_state(&self) -> RngState {
        self.rng.snapshot()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stored population fitness of every checkpointed generation of this process.
    pub fn fitness_history(&self) -> Result<Vec<Vec<f64>>> {
        fitness_history(&self.store, self.process_id)
    }
}

/// Reads the population fitness of every stored generation of `process_id`,
/// indexed by generation. Unevaluated individuals read as NaN.
pub fn fitness_history<S: CheckpointStore + ?Sized>(
    store: &S,
    process_id: u64,
) -> Result<Vec<Vec<f64>>> {
    store
        .generations(process_id)?
        .into_iter()
        .map(|generation_index| {
            Ok(store
                .individuals(process_id, generation_index)?
                .iter()
                .map(|r| r.fitness.unwrap_or(f64::NAN))
                .collect())
        })
        .collect()
}
