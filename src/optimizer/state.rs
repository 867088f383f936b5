use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::evaluation::SimulationConfig;
use crate::genotype::Genotype;
use crate::rng::RngState;
use crate::store::IndividualRecord;

use super::config::OptimizerConfig;

/// The persisted snapshot of an optimizer after one generation.
///
/// One row exists per `(process_id, generation_index)`. Together with the
/// generation's individuals it is enough to continue the run exactly where it
/// stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub process_id: u64,
    pub generation_index: u64,
    pub rng_state: RngState,
    pub simulation_time: u32,
    pub sampling_frequency: f64,
    pub control_frequency: f64,
    pub num_generations: u64,
    pub population_size: usize,
    pub offspring_size: usize,
    pub fitness_function: String,
    pub body_name: String,
    /// Id handed to the next bred individual. Ids of discarded offspring are
    /// never reused, so this can exceed every id in the stored population.
    pub next_individual_id: u64,
}

impl OptimizerState {
    pub(crate) fn capture(
        process_id: u64,
        generation_index: u64,
        rng_state: RngState,
        next_individual_id: u64,
        config: &OptimizerConfig,
    ) -> Self {
        let simulation = config.simulation();
        Self {
            process_id,
            generation_index,
            rng_state,
            simulation_time: simulation.simulation_time,
            sampling_frequency: simulation.sampling_frequency,
            control_frequency: simulation.control_frequency,
            num_generations: config.num_generations(),
            population_size: config.population_size(),
            offspring_size: config.offspring_size(),
            fitness_function: config.fitness_function().to_string(),
            body_name: config.body_name().to_string(),
            next_individual_id,
        }
    }

    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            simulation_time: self.simulation_time,
            sampling_frequency: self.sampling_frequency,
            control_frequency: self.control_frequency,
        }
    }

    /// Whether the run this row belongs to has evaluated its last generation.
    pub fn is_final(&self) -> bool {
        self.generation_index >= self.num_generations
    }

    /// Checks that a caller's configuration describes the same run as this row.
    ///
    /// `seed`, `num_generations`, `n_jobs` and `headless` are not compared.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::Configuration`] naming the first field that
    /// differs.
    pub fn ensure_matches(&self, config: &OptimizerConfig) -> Result<()> {
        let simulation = config.simulation();
        let mismatch = |field: &str, stored: &dyn std::fmt::Debug, given: &dyn std::fmt::Debug| {
            OptimizerError::Configuration(format!(
                "Process {} was stored with {} = {:?}, but the configuration has {:?}",
                self.process_id, field, stored, given
            ))
        };

        if self.simulation_time != simulation.simulation_time {
            return Err(mismatch(
                "simulation_time",
                &self.simulation_time,
                &simulation.simulation_time,
            ));
        }
        if self.sampling_frequency != simulation.sampling_frequency {
            return Err(mismatch(
                "sampling_frequency",
                &self.sampling_frequency,
                &simulation.sampling_frequency,
            ));
        }
        if self.control_frequency != simulation.control_frequency {
            return Err(mismatch(
                "control_frequency",
                &self.control_frequency,
                &simulation.control_frequency,
            ));
        }
        if self.fitness_function != config.fitness_function() {
            return Err(mismatch(
                "fitness_function",
                &self.fitness_function,
                &config.fitness_function(),
            ));
        }
        if self.body_name != config.body_name() {
            return Err(mismatch("body_name", &self.body_name, &config.body_name()));
        }
        if self.population_size != config.population_size() {
            return Err(mismatch(
                "population_size",
                &self.population_size,
                &config.population_size(),
            ));
        }
        if self.offspring_size != config.offspring_size() {
            return Err(mismatch(
                "offspring_size",
                &self.offspring_size,
                &config.offspring_size(),
            ));
        }
        Ok(())
    }
}

/// A member of the population together with its lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual<G> {
    pub id: u64,
    pub genotype: G,
    /// `None` until the individual has been evaluated.
    pub fitness: Option<f64>,
    pub parent_ids: Vec<u64>,
}

impl<G: Genotype> Individual<G> {
    pub fn new(id: u64, genotype: G, parent_ids: Vec<u64>) -> Self {
        Self {
            id,
            genotype,
            fitness: None,
            parent_ids,
        }
    }

    pub(crate) fn to_record(&self, ordinal: usize) -> Result<IndividualRecord> {
        Ok(IndividualRecord {
            ordinal,
            individual_id: self.id,
            genotype: serde_json::to_string(&self.genotype)?,
            fitness: self.fitness,
            parent_ids: self.parent_ids.clone(),
        })
    }

    /// Rebuilds an evaluated individual from its stored record.
    pub(crate) fn from_record(record: &IndividualRecord) -> Result<Self> {
        let genotype = serde_json::from_str(&record.genotype).map_err(|e| {
            OptimizerError::IncompatibleState(format!(
                "Stored genotype of individual {} cannot be decoded: {}",
                record.individual_id, e
            ))
        })?;
        let fitness = record.fitness.ok_or_else(|| {
            OptimizerError::IncompatibleState(format!(
                "Stored individual {} has no fitness",
                record.individual_id
            ))
        })?;
        Ok(Self {
            id: record.individual_id,
            genotype,
            fitness: Some(fitness),
            parent_ids: record.parent_ids.clone(),
        })
    }
}
