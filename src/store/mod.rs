//! # Checkpoint Stores
//!
//! A checkpoint store durably records, per optimization process, one
//! [`OptimizerState`] row per completed generation together with that
//! generation's population as [`IndividualRecord`]s. Stores are append-only:
//! rows are never updated or removed, and [`CheckpointStore::append`] only
//! accepts the generation directly after the latest stored one, so the
//! generation indices of a process always form the gap-free sequence `0..=n`.
//!
//! Two implementations are provided: [`MemoryStore`] for tests and short
//! experiments, and [`SqliteStore`] for durable runs.
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::optimizer::state::OptimizerState;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// One stored member of a generation's population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualRecord {
    /// Position of the individual within its generation.
    pub ordinal: usize,
    /// Run-wide unique id of the individual.
    pub individual_id: u64,
    /// The genotype serialized as JSON.
    pub genotype: String,
    pub fitness: Option<f64>,
    /// Ids of the individuals this one was bred from; empty for the initial population.
    pub parent_ids: Vec<u64>,
}

/// Everything appended to a store for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationCheckpoint {
    pub state: OptimizerState,
    pub individuals: Vec<IndividualRecord>,
}

/// Durable, append-only storage of optimizer checkpoints.
///
/// Implementations assume a single writer per process id.
pub trait CheckpointStore: Send + Sync {
    /// Appends one generation atomically: either the state row and all
    /// individual records become visible, or nothing does.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::Storage`] if the write fails or if the
    /// generation index is not exactly one past the latest stored generation
    /// (zero for a new process).
    fn append(&self, checkpoint: &GenerationCheckpoint) -> Result<()>;

    /// Returns the state row with the highest generation index for `process_id`.
    fn latest(&self, process_id: u64) -> Result<Option<OptimizerState>>;

    /// Returns the stored population of one generation, ordered by ordinal.
    fn individuals(&self, process_id: u64, generation_index: u64)
        -> Result<Vec<IndividualRecord>>;

    /// Returns every stored generation index for `process_id` in ascending order.
    fn generations(&self, process_id: u64) -> Result<Vec<u64>>;

    /// Returns whether any individual record exists for `process_id`.
    fn has_individuals(&self, process_id: u64) -> Result<bool>;
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    fn append(&self, checkpoint: &GenerationCheckpoint) -> Result<()> {
        (**self).append(checkpoint)
    }

    fn latest(&self, process_id: u64) -> Result<Option<OptimizerState>> {
        (**self).latest(process_id)
    }

    fn individuals(
        &self,
        process_id: u64,
        generation_index: u64,
    ) -> Result<Vec<IndividualRecord>> {
        (**self).individuals(process_id, generation_index)
    }

    fn generations(&self, process_id: u64) -> Result<Vec<u64>> {
        (**self).generations(process_id)
    }

    fn has_individuals(&self, process_id: u64) -> Result<bool> {
        (**self).has_individuals(process_id)
    }
}

/// Checks that `next` may follow `latest` in a process's generation sequence.
pub(crate) fn check_next_generation(
    process_id: u64,
    latest: Option<u64>,
    next: u64,
) -> Result<()> {
    let expected = latest.map_or(0, |g| g + 1);
    if next != expected {
        return Err(OptimizerError::Storage(format!(
            "Process {} cannot append generation {}: expected generation {}",
            process_id, next, expected
        )));
    }
    Ok(())
}
