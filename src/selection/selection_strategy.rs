use std::cmp::Ordering;
use std::fmt::Debug;

use crate::error::{OptimizerError, Result};
use crate::rng::RandomNumberGenerator;

/// Trait for selection strategies.
///
/// Strategies work on fitness values alone and return indices into the
/// fitness slice, so callers keep full control over the individuals they
/// select. Higher fitness is better.
///
/// # Examples
///
/// ```
/// use roboevo::rng::RandomNumberGenerator;
/// use roboevo::selection::{ElitistSelection, SelectionStrategy};
///
/// let fitness = vec![0.5, 0.8, 0.3];
/// let mut rng = RandomNumberGenerator::from_seed(0);
///
/// let selected = ElitistSelection.select(&fitness, 2, &mut rng).unwrap();
/// assert_eq!(selected, vec![1, 0]);
/// ```
pub trait SelectionStrategy: Debug + Send + Sync {
    /// Selects `num_to_select` indices into `fitness`.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::EmptyPopulation`] if `fitness` is empty and
    /// `num_to_select` is non-zero.
    fn select(
        &self,
        fitness: &[f64],
        num_to_select: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<usize>>;
}

/// Orders fitness values best first, with NaN ranked below everything.
pub(crate) fn compare_fitness(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

pub(crate) fn ensure_non_empty(fitness: &[f64], num_to_select: usize) -> Result<()> {
    if fitness.is_empty() && num_to_select > 0 {
        return Err(OptimizerError::EmptyPopulation);
    }
    Ok(())
}
