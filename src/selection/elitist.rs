use crate::error::Result;
use crate::rng::RandomNumberGenerator;

use super::selection_strategy::{compare_fitness, ensure_non_empty, SelectionStrategy};

/// Truncation selection: keeps the best individuals.
///
/// Indices are returned best first. Ties keep their input order, so when the
/// current population precedes its offspring in the fitness slice, incumbents
/// win ties. Never selects an index twice; asking for more than are available
/// returns all of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElitistSelection;

impl SelectionStrategy for ElitistSelection {
    fn select(
        &self,
        fitness: &[f64],
        num_to_select: usize,
        _rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<usize>> {
        ensure_non_empty(fitness, num_to_select)?;

        let mut ranked: Vec<usize> = (0..fitness.len()).collect();
        // sort_by is stable
        ranked.sort_by(|&a, &b| compare_fitness(fitness[a], fitness[b]));
        ranked.truncate(num_to_select);
        Ok(ranked)
    }
}
