use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::error::{OptimizerError, Result};
use crate::genotype::Genotype;

use super::fitness::FitnessFn;
use super::oracle::{EvaluationOracle, SimulationContext};
use super::pose::PoseStrategy;
use super::simulation::{ResultRecord, SimulationConfig};

/// Fitness values and result records of one batch, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluatedBatch {
    pub fitness: Vec<f64>,
    pub results: Vec<ResultRecord>,
}

impl EvaluatedBatch {
    pub fn len(&self) -> usize {
        self.fitness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fitness.is_empty()
    }
}

/// Maps a batch of genotypes to result records through an [`EvaluationOracle`].
///
/// With `n_jobs <= 1` genotypes are evaluated one after another on the calling
/// thread, using the configured headless flag. With `n_jobs > 1` they are
/// spread over a dedicated pool of `n_jobs` worker threads; workers always run
/// headless. Results come back in input order either way.
///
/// A failing evaluation never fails the batch: oracle errors, panics and
/// failed health checks all produce an invalid [`ResultRecord`] for that
/// genotype only.
pub struct BatchEvaluator<G, O, P>
where
    G: Genotype,
    O: EvaluationOracle<G>,
    P: PoseStrategy<G::Body>,
{
    oracle: O,
    pose_strategy: P,
    simulation: SimulationConfig,
    n_jobs: usize,
    headless: bool,
    pool: Option<ThreadPool>,
    _marker: PhantomData<fn() -> G>,
}

impl<G, O, P> BatchEvaluator<G, O, P>
where
    G: Genotype,
    O: EvaluationOracle<G>,
    P: PoseStrategy<G::Body>,
{
    /// Creates a new evaluator.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::Configuration`] if the worker pool cannot be built.
    pub fn new(
        oracle: O,
        pose_strategy: P,
        simulation: SimulationConfig,
        n_jobs: usize,
        headless: bool,
    ) -> Result<Self> {
        let pool = if n_jobs > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(n_jobs)
                .thread_name(|i| format!("roboevo-eval-{}", i))
                .build()
                .map_err(|e| {
                    OptimizerError::Configuration(format!(
                        "Failed to build evaluation pool with {} workers: {}",
                        n_jobs, e
                    ))
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            oracle,
            pose_strategy,
            simulation,
            n_jobs,
            headless,
            pool,
            _marker: PhantomData,
        })
    }

    pub fn simulation(&self) -> &SimulationConfig {
        &self.simulation
    }

    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    /// Evaluates every genotype and returns one result record per genotype, in input order.
    pub fn evaluate_batch(&self, genotypes: &[G]) -> Vec<ResultRecord> {
        info!(
            evaluations = genotypes.len(),
            n_jobs = self.n_jobs,
            "Starting simulation batch"
        );

        let results: Vec<ResultRecord> = match &self.pool {
            Some(pool) => {
                let context = SimulationContext { headless: true };
                // Indexed collect places each result at its input position,
                // whatever order the workers finish in.
                pool.install(|| {
                    genotypes
                        .par_iter()
                        .map(|genotype| self.evaluate_one(genotype, &context))
                        .collect()
                })
            }
            None => {
                let context = SimulationContext {
                    headless: self.headless,
                };
                genotypes
                    .iter()
                    .map(|genotype| self.evaluate_one(genotype, &context))
                    .collect()
            }
        };

        let invalid = results.iter().filter(|r| !r.valid).count();
        info!(evaluations = results.len(), invalid, "Finished batch");
        results
    }

    /// Evaluates the batch and applies `fitness` to every result record.
    pub fn evaluate_with_fitness(&self, genotypes: &[G], fitness: FitnessFn) -> EvaluatedBatch {
        let results = self.evaluate_batch(genotypes);
        let fitness = results.iter().map(fitness).collect();
        EvaluatedBatch { fitness, results }
    }

    fn evaluate_one(&self, genotype: &G, context: &SimulationContext) -> ResultRecord {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let (body, mut controller) = genotype.develop();
            let pose = self.pose_strategy.initial_pose(&body);
            self.oracle
                .evaluate(&body, &mut controller, &self.simulation, &pose, context)
        }));

        match outcome {
            Ok(Ok(record)) => {
                let unhealthy = record
                    .states
                    .iter()
                    .position(|state| !genotype.is_healthy(state));
                match unhealthy {
                    Some(sample) => {
                        debug!(sample, "Health check failed");
                        record.invalidate(format!("Health check failed at sample {}", sample))
                    }
                    None => record,
                }
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Evaluation failed");
                ResultRecord::failed(err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(panic = %message, "Evaluation panicked");
                ResultRecord::failed(format!("Evaluation panicked: {}", message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::fitness::forward_x_fitness;
    use crate::evaluation::pose::{OriginPose, StandingPose};
    use crate::evaluation::test_support::{Genes, SumOracle, FAIL, PANIC, SINK};

    fn batch() -> Vec<Genes> {
        vec![
            Genes(vec![1.0, 2.0]),
            Genes(vec![SINK, 0.0]),
            Genes(vec![FAIL, 0.0]),
            Genes(vec![PANIC, 0.0]),
            Genes(vec![4.0, 0.5]),
        ]
    }

    #[test]
    fn test_failures_are_isolated() {
        let evaluator =
            BatchEvaluator::new(SumOracle, OriginPose, SimulationConfig::default(), 1, true)
                .unwrap();
        let results = evaluator.evaluate_batch(&batch());

        assert_eq!(results.len(), 5);
        assert!(results[0].valid);
        assert!(!results[1].valid);
        assert_eq!(results[1].states.len(), 2);
        assert!(results[2].failure.as_deref().unwrap().contains("simulator refused"));
        assert!(results[3].failure.as_deref().unwrap().contains("simulator crashed"));
        assert!(results[4].valid);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let genotypes: Vec<Genes> = (0..32).map(|i| Genes(vec![i as f64, 0.25])).collect();
        let sequential =
            BatchEvaluator::new(SumOracle, OriginPose, SimulationConfig::default(), 1, true)
                .unwrap()
                .evaluate_with_fitness(&genotypes, forward_x_fitness);
        let parallel =
            BatchEvaluator::new(SumOracle, OriginPose, SimulationConfig::default(), 4, true)
                .unwrap()
                .evaluate_with_fitness(&genotypes, forward_x_fitness);

        assert_eq!(sequential, parallel);
        assert_eq!(parallel.fitness[7], 7.25);
    }

    #[test]
    fn test_pose_is_applied() {
        let evaluator = BatchEvaluator::new(
            SumOracle,
            StandingPose { height: 0.5 },
            SimulationConfig::default(),
            1,
            true,
        )
        .unwrap();
        let results = evaluator.evaluate_batch(&[Genes(vec![1.0])]);
        assert_eq!(results[0].states[0].position, [0.0, 0.0, 0.5]);
        assert_eq!(results[0].states[1].time, 30.0);
    }

    #[test]
    fn test_empty_batch() {
        let evaluator = BatchEvaluator::<Genes, _, _>::new(
            SumOracle,
            OriginPose,
            SimulationConfig::default(),
            3,
            true,
        )
        .unwrap();
        assert!(evaluator.evaluate_with_fitness(&[], forward_x_fitness).is_empty());
    }
}
