pub mod error;
pub mod evaluation;
pub mod genotype;
pub mod optimizer;
pub mod rng;
pub mod selection;
pub mod store;
pub mod telemetry;

// Re-export commonly used types for convenience
pub use error::{OptimizerError, Result, ResultExt};
pub use genotype::Genotype;
pub use optimizer::{
    InitResult, Optimizer, OptimizerBuilder, OptimizerConfig, RunOutcome, StopHandle,
};
