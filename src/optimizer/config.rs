//! # OptimizerConfig
//!
//! `OptimizerConfig` holds every setting of a run. It is validated once when
//! built and never changes afterwards.
//!
//! ## Example
//!
//! ```rust
//! use roboevo::optimizer::OptimizerConfig;
//!
//! let config = OptimizerConfig::builder()
//!     .seed(420)
//!     .population_size(10)
//!     .offspring_size(10)
//!     .num_generations(50)
//!     .fitness_function("displacement")
//!     .body_name("spider")
//!     .n_jobs(4)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.population_size(), 10);
//! assert_eq!(config.simulation().simulation_time, 30);
//! ```
//!
//! Configurations can also be read from JSON; missing keys take the defaults:
//!
//! ```rust
//! use roboevo::optimizer::OptimizerConfig;
//!
//! let config = OptimizerConfig::from_json_str(
//!     r#"{ "seed": 7, "num_generations": 3, "simulation_time": 10, "body_name": "erectus" }"#,
//! )
//! .unwrap();
//! assert_eq!(config.seed(), 7);
//! assert_eq!(config.simulation().simulation_time, 10);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::evaluation::SimulationConfig;

/// Validated, immutable settings of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    seed: u64,
    population_size: usize,
    offspring_size: usize,
    num_generations: u64,
    #[serde(flatten)]
    simulation: SimulationConfig,
    fitness_function: String,
    body_name: String,
    n_jobs: usize,
    headless: bool,
    tournament_size: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            seed: 420,
            population_size: 10,
            offspring_size: 10,
            num_generations: 50,
            simulation: SimulationConfig::default(),
            fitness_function: "displacement".to_string(),
            body_name: "default".to_string(),
            n_jobs: 1,
            headless: true,
            tournament_size: 2,
        }
    }
}

impl OptimizerConfig {
    /// Returns a builder for creating an `OptimizerConfig` instance.
    pub fn builder() -> OptimizerConfigBuilder {
        OptimizerConfigBuilder::default()
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OptimizerError::Configuration(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn population_size(&self) -> usize {
        self.population_size
    }

    pub fn offspring_size(&self) -> usize {
        self.offspring_size
    }

    /// Index of the last generation of the run.
    pub fn num_generations(&self) -> u64 {
        self.num_generations
    }

    pub fn simulation(&self) -> &SimulationConfig {
        &self.simulation
    }

    pub fn fitness_function(&self) -> &str {
        &self.fitness_function
    }

    pub fn body_name(&self) -> &str {
        &self.body_name
    }

    /// Upper bound on concurrent evaluations; `0` and `1` both mean sequential.
    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    pub fn headless(&self) -> bool {
        self.headless
    }

    pub fn tournament_size(&self) -> usize {
        self.tournament_size
    }

    /// Copy of this configuration ending at `num_generations`. Used when a
    /// resumed run adopts the generation count stored with its checkpoints.
    pub(crate) fn with_num_generations(&self, num_generations: u64) -> Self {
        Self {
            num_generations,
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(OptimizerError::Configuration(
                "Population size cannot be zero".to_string(),
            ));
        }
        if self.tournament_size == 0 {
            return Err(OptimizerError::Configuration(
                "Tournament size must be at least 1".to_string(),
            ));
        }
        if self.simulation.simulation_time == 0 {
            return Err(OptimizerError::Configuration(
                "Simulation time must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("Sampling frequency", self.simulation.sampling_frequency),
            ("Control frequency", self.simulation.control_frequency),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(OptimizerError::Configuration(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.fitness_function.is_empty() {
            return Err(OptimizerError::Configuration(
                "Fitness function name cannot be empty".to_string(),
            ));
        }
        if self.body_name.is_empty() {
            return Err(OptimizerError::Configuration(
                "Body name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for `OptimizerConfig`.
///
/// Unset values fall back to [`OptimizerConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct OptimizerConfigBuilder {
    seed: Option<u64>,
    population_size: Option<usize>,
    offspring_size: Option<usize>,
    num_generations: Option<u64>,
    simulation: Option<SimulationConfig>,
    fitness_function: Option<String>,
    body_name: Option<String>,
    n_jobs: Option<usize>,
    headless: Option<bool>,
    tournament_size: Option<usize>,
}

impl OptimizerConfigBuilder {
    pub fn seed(mut self, value: u64) -> Self {
        self.seed = Some(value);
        self
    }

    pub fn population_size(mut self, value: usize) -> Self {
        self.population_size = Some(value);
        self
    }

    pub fn offspring_size(mut self, value: usize) -> Self {
        self.offspring_size = Some(value);
        self
    }

    pub fn num_generations(mut self, value: u64) -> Self {
        self.num_generations = Some(value);
        self
    }

    pub fn simulation(mut self, value: SimulationConfig) -> Self {
        self.simulation = Some(value);
        self
    }

    pub fn fitness_function(mut self, value: impl Into<String>) -> Self {
        self.fitness_function = Some(value.into());
        self
    }

    pub fn body_name(mut self, value: impl Into<String>) -> Self {
        self.body_name = Some(value.into());
        self
    }

    pub fn n_jobs(mut self, value: usize) -> Self {
        self.n_jobs = Some(value);
        self
    }

    pub fn headless(mut self, value: bool) -> Self {
        self.headless = Some(value);
        self
    }

    pub fn tournament_size(mut self, value: usize) -> Self {
        self.tournament_size = Some(value);
        self
    }

    /// Builds and validates the `OptimizerConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::Configuration`] for a zero population or
    /// tournament size, a zero simulation time, non-positive frequencies or
    /// empty names.
    pub fn build(self) -> Result<OptimizerConfig> {
        let defaults = OptimizerConfig::default();
        let config = OptimizerConfig {
            seed: self.seed.unwrap_or(defaults.seed),
            population_size: self.population_size.unwrap_or(defaults.population_size),
            offspring_size: self.offspring_size.unwrap_or(defaults.offspring_size),
            num_generations: self.num_generations.unwrap_or(defaults.num_generations),
            simulation: self.simulation.unwrap_or(defaults.simulation),
            fitness_function: self.fitness_function.unwrap_or(defaults.fitness_function),
            body_name: self.body_name.unwrap_or(defaults.body_name),
            n_jobs: self.n_jobs.unwrap_or(defaults.n_jobs),
            headless: self.headless.unwrap_or(defaults.headless),
            tournament_size: self.tournament_size.unwrap_or(defaults.tournament_size),
        };
        config.validate()?;
        Ok(config)
    }
}
