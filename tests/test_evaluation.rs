mod common;

use std::sync::{Arc, Mutex};

use common::{builder, config, initial_population, start, stored_generations, Gait, Track, CRASH, SINK};
use roboevo::error::{OptimizerError, Result};
use roboevo::evaluation::{
    BatchEvaluator, FitnessRegistry, OriginPose, ResultRecord, SimulationConfig,
};
use roboevo::optimizer::{OptimizerConfig, RunOutcome};
use roboevo::store::{CheckpointStore, MemoryStore};
use roboevo::telemetry::{GenerationReport, TelemetrySink};

fn ramp(size: usize) -> Vec<Gait> {
    (0..size).map(|i| Gait::new(vec![i as f64, 0.5])).collect()
}

#[test]
fn test_parallel_batch_keeps_input_order() {
    let simulation = SimulationConfig::default();
    let fitness = FitnessRegistry::with_builtins().resolve("forward_x").unwrap();
    let genotypes = ramp(10);

    let sequential = BatchEvaluator::new(Track::sleepy(), OriginPose, simulation, 1, true)
        .unwrap()
        .evaluate_with_fitness(&genotypes, fitness);
    let parallel = BatchEvaluator::new(Track::sleepy(), OriginPose, simulation, 4, true)
        .unwrap()
        .evaluate_with_fitness(&genotypes, fitness);

    assert_eq!(sequential, parallel);
    let expected: Vec<f64> = (0..10).map(|i| i as f64 + 0.5).collect();
    assert_eq!(parallel.fitness, expected);
}

#[test]
fn test_parallel_run_matches_sequential_run() {
    let store = Arc::new(MemoryStore::new());
    start(config(3), store.clone(), 1).run().unwrap();

    let parallel = OptimizerConfig::from_json_str(
        r#"{ "seed": 420, "population_size": 6, "offspring_size": 6, "num_generations": 3,
             "simulation_time": 5, "fitness_function": "forward_x", "body_name": "gait",
             "n_jobs": 4 }"#,
    )
    .unwrap();
    start(parallel, store.clone(), 2).run().unwrap();

    assert_eq!(stored_generations(&store, 1), stored_generations(&store, 2));
}

#[test]
fn test_unhealthy_genotype_is_isolated() {
    let mut genotypes = ramp(5);
    genotypes[2] = Gait::new(vec![SINK, 2000.0]);
    let fitness = FitnessRegistry::with_builtins().resolve("forward_x").unwrap();

    for n_jobs in [1, 3] {
        let batch = BatchEvaluator::new(
            Track::default(),
            OriginPose,
            SimulationConfig::default(),
            n_jobs,
            true,
        )
        .unwrap()
        .evaluate_with_fitness(&genotypes, fitness);

        assert_eq!(batch.len(), 5);
        for (i, result) in batch.results.iter().enumerate() {
            assert_eq!(result.valid, i != 2, "result {}", i);
        }
        assert_eq!(batch.fitness[2], 0.0);
        assert_eq!(batch.fitness[4], 4.5);
        assert!(batch.results[2].failure.is_some());
    }
}

#[test]
fn test_failing_simulation_does_not_abort_run() {
    common::init_tracing();
    let store = Arc::new(MemoryStore::new());
    let mut population = initial_population(6);
    population[0] = Gait::new(vec![CRASH, 0.0, 0.0]);

    let mut optimizer = builder(config(2), store.clone(), Track::default())
        .with_initial_population(population)
        .initialize(1)
        .unwrap()
        .into_optimizer()
        .unwrap();

    assert_eq!(
        optimizer.run().unwrap(),
        RunOutcome::Completed { generation_index: 2 }
    );
    let generation_zero = store.individuals(1, 0).unwrap();
    assert_eq!(generation_zero[0].fitness, Some(0.0));
}

#[test]
fn test_population_size_is_constant() {
    for offspring_size in [0, 1, 6, 25] {
        let store = Arc::new(MemoryStore::new());
        let config = OptimizerConfig::builder()
            .population_size(6)
            .offspring_size(offspring_size)
            .num_generations(3)
            .fitness_function("forward_x")
            .body_name("gait")
            .build()
            .unwrap();
        let mut optimizer = start(config, store.clone(), 1);
        optimizer.run().unwrap();

        assert_eq!(optimizer.population().len(), 6);
        for g in store.generations(1).unwrap() {
            assert_eq!(store.individuals(1, g).unwrap().len(), 6);
        }
    }
}

#[test]
fn test_without_offspring_population_is_unchanged() {
    let store = Arc::new(MemoryStore::new());
    let config = OptimizerConfig::builder()
        .population_size(6)
        .offspring_size(0)
        .num_generations(2)
        .fitness_function("forward_x")
        .body_name("gait")
        .build()
        .unwrap();
    let mut optimizer = start(config, store.clone(), 1);
    optimizer.run().unwrap();

    let mut ids: Vec<u64> = optimizer.population().iter().map(|i| i.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
}

#[derive(Clone, Default)]
struct Recorder {
    reports: Arc<Mutex<Vec<GenerationReport>>>,
}

impl TelemetrySink for Recorder {
    fn report(&mut self, generation_index: u64, fitness: &[f64], results: &[ResultRecord]) -> Result<()> {
        let report = GenerationReport::from_batch(generation_index, fitness, results);
        self.reports.lock().unwrap().push(report);
        Ok(())
    }
}

struct Broken;

impl TelemetrySink for Broken {
    fn report(&mut self, _: u64, _: &[f64], _: &[ResultRecord]) -> Result<()> {
        Err(OptimizerError::Telemetry("dashboard unreachable".to_string()))
    }
}

struct Panicking;

impl TelemetrySink for Panicking {
    fn report(&mut self, _: u64, _: &[f64], _: &[ResultRecord]) -> Result<()> {
        panic!("telemetry exploded")
    }
}

#[test]
fn test_telemetry_sees_every_generation() {
    let store = Arc::new(MemoryStore::new());
    let recorder = Recorder::default();
    let mut optimizer = builder(config(3), store.clone(), Track::default())
        .with_initial_population(initial_population(6))
        .with_telemetry(recorder.clone())
        .initialize(1)
        .unwrap()
        .into_optimizer()
        .unwrap();
    optimizer.run().unwrap();

    let reports = recorder.reports.lock().unwrap();
    let generations: Vec<u64> = reports.iter().map(|r| r.generation_index).collect();
    assert_eq!(generations, vec![0, 1, 2, 3]);
    assert_eq!(reports[0].evaluations, 6);
    assert_eq!(reports[1].evaluations, 6);
    assert_eq!(reports[0].invalid, 0);
}

#[test]
fn test_telemetry_failure_is_not_fatal() {
    common::init_tracing();
    let store = Arc::new(MemoryStore::new());
    start(config(3), store.clone(), 1).run().unwrap();

    let mut broken = builder(config(3), store.clone(), Track::default())
        .with_initial_population(initial_population(6))
        .with_telemetry(Broken)
        .initialize(2)
        .unwrap()
        .into_optimizer()
        .unwrap();
    assert!(broken.run().is_ok());

    let mut panicking = builder(config(3), store.clone(), Track::default())
        .with_initial_population(initial_population(6))
        .with_telemetry(Panicking)
        .initialize(3)
        .unwrap()
        .into_optimizer()
        .unwrap();
    assert!(panicking.run().is_ok());

    let reference = stored_generations(&store, 1);
    assert_eq!(stored_generations(&store, 2), reference);
    assert_eq!(stored_generations(&store, 3), reference);
}
