use crate::error::{OptimizerError, Result};
use crate::rng::RandomNumberGenerator;

use super::selection_strategy::{compare_fitness, ensure_non_empty, SelectionStrategy};

/// A selection strategy that selects individuals through tournament selection.
///
/// Each pick draws `tournament_size` contestants uniformly with replacement
/// and keeps the fittest; ties go to the contestant drawn first. Picks are
/// independent, so the same index may be returned more than once, which is
/// what parent selection needs.
///
/// Smaller tournaments explore more; larger tournaments exploit more.
///
/// # Examples
///
/// ```
/// use roboevo::rng::RandomNumberGenerator;
/// use roboevo::selection::{SelectionStrategy, TournamentSelection};
///
/// let fitness = vec![0.5, 0.8, 0.3, 0.9, 0.1];
/// let mut rng = RandomNumberGenerator::from_seed(420);
///
/// let selection = TournamentSelection::new(2).unwrap();
/// let parents = selection.select(&fitness, 4, &mut rng).unwrap();
/// assert_eq!(parents.len(), 4);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TournamentSelection {
    tournament_size: usize,
}

impl TournamentSelection {
    /// Creates a new TournamentSelection strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if `tournament_size` is 0.
    pub fn new(tournament_size: usize) -> Result<Self> {
        if tournament_size < 1 {
            return Err(OptimizerError::Configuration(
                "Tournament size must be at least 1".to_string(),
            ));
        }
        Ok(Self { tournament_size })
    }

    pub fn tournament_size(&self) -> usize {
        self.tournament_size
    }

    /// Runs a single tournament and returns the index of the winner.
    fn run_tournament(&self, fitness: &[f64], rng: &mut RandomNumberGenerator) -> usize {
        let mut best = rng.gen_index(fitness.len());
        for _ in 1..self.tournament_size {
            let contestant = rng.gen_index(fitness.len());
            if compare_fitness(fitness[contestant], fitness[best]).is_lt() {
                best = contestant;
            }
        }
        best
    }
}

impl Default for TournamentSelection {
    fn default() -> Self {
        Self { tournament_size: 2 }
    }
}

impl SelectionStrategy for TournamentSelection {
    fn select(
        &self,
        fitness: &[f64],
        num_to_select: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<usize>> {
        ensure_non_empty(fitness, num_to_select)?;
        Ok((0..num_to_select)
            .map(|_| self.run_tournament(fitness, rng))
            .collect())
    }
}
