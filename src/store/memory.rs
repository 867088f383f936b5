use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{OptimizerError, Result};
use crate::optimizer::state::OptimizerState;

use super::{check_next_generation, CheckpointStore, GenerationCheckpoint, IndividualRecord};

#[derive(Debug, Default)]
struct Tables {
    states: BTreeMap<(u64, u64), OptimizerState>,
    individuals: BTreeMap<(u64, u64), Vec<IndividualRecord>>,
}

/// An in-process checkpoint store.
///
/// Keeps everything behind a single mutex, which also makes each append
/// atomic. Contents are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| OptimizerError::Storage("Memory store mutex poisoned".to_string()))
    }
}

fn latest_generation(tables: &Tables, process_id: u64) -> Option<u64> {
    tables
        .states
        .range((process_id, 0)..=(process_id, u64::MAX))
        .next_back()
        .map(|(&(_, g), _)| g)
}

impl CheckpointStore for MemoryStore {
    fn append(&self, checkpoint: &GenerationCheckpoint) -> Result<()> {
        let mut tables = self.lock()?;
        let process_id = checkpoint.state.process_id;
        let generation_index = checkpoint.state.generation_index;
        check_next_generation(
            process_id,
            latest_generation(&tables, process_id),
            generation_index,
        )?;

        let key = (process_id, generation_index);
        tables.states.insert(key, checkpoint.state.clone());
        tables
            .individuals
            .insert(key, checkpoint.individuals.clone());
        Ok(())
    }

    fn latest(&self, process_id: u64) -> Result<Option<OptimizerState>> {
        let tables = self.lock()?;
        Ok(latest_generation(&tables, process_id)
            .and_then(|g| tables.states.get(&(process_id, g)).cloned()))
    }

    fn individuals(
        &self,
        process_id: u64,
        generation_index: u64,
    ) -> Result<Vec<IndividualRecord>> {
        let tables = self.lock()?;
        let mut records = tables
            .individuals
            .get(&(process_id, generation_index))
            .cloned()
            .unwrap_or_default();
        records.sort_by_key(|r| r.ordinal);
        Ok(records)
    }

    fn generations(&self, process_id: u64) -> Result<Vec<u64>> {
        let tables = self.lock()?;
        Ok(tables
            .states
            .range((process_id, 0)..=(process_id, u64::MAX))
            .map(|(&(_, g), _)| g)
            .collect())
    }

    fn has_individuals(&self, process_id: u64) -> Result<bool> {
        let tables = self.lock()?;
        Ok(tables
            .individuals
            .range((process_id, 0)..=(process_id, u64::MAX))
            .any(|(_, records)| !records.is_empty()))
    }
}
