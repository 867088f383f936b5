//! # Telemetry
//!
//! After each generation's evaluation the optimizer hands the evaluated batch
//! to an optional [`TelemetrySink`]. Reporting is best effort: an error (or a
//! panic) inside a sink is logged and otherwise ignored, and never affects the
//! generational loop or its checkpoints.
//!
//! [`GenerationReport`] condenses a batch into the statistics that were logged
//! per generation in past experiments: fitness and displacement summaries plus
//! histograms of displacement, relative peak height and ground contact.

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::evaluation::measures::{
    displacement_measure, ground_contact_measure, max_height_relative_to_avg_height_measure,
};
use crate::evaluation::ResultRecord;

/// Number of bins used by [`GenerationReport`] histograms.
pub const HISTOGRAM_BINS: usize = 10;

/// Receives the evaluated batch of every generation.
pub trait TelemetrySink: Send {
    fn report(
        &mut self,
        generation_index: u64,
        fitness: &[f64],
        results: &[ResultRecord],
    ) -> Result<()>;
}

/// Minimum, maximum and mean of the finite values in a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Summary {
    /// Summarizes the finite values of `values`; `None` if there are none.
    pub fn of(values: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        Some(Self { min, max, mean })
    }
}

/// Equal-width histogram over the finite values of a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Bins the finite values of `values`; `None` if there are none or `bins` is zero.
    pub fn of(values: &[f64], bins: usize) -> Option<Self> {
        let summary = Summary::of(values)?;
        if bins == 0 {
            return None;
        }
        let mut counts = vec![0; bins];
        let width = (summary.max - summary.min) / bins as f64;
        for v in values.iter().copied().filter(|v| v.is_finite()) {
            let bin = if width > 0.0 {
                (((v - summary.min) / width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[bin] += 1;
        }
        Some(Self {
            min: summary.min,
            max: summary.max,
            counts,
        })
    }
}

/// Statistics of one generation's evaluated batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationReport {
    pub generation_index: u64,
    pub evaluations: usize,
    pub invalid: usize,
    pub fitness: Option<Summary>,
    pub displacement: Option<Summary>,
    pub displacement_histogram: Option<Histogram>,
    pub max_height_relative_to_avg_height_histogram: Option<Histogram>,
    pub ground_contact_histogram: Option<Histogram>,
}

impl GenerationReport {
    pub fn from_batch(generation_index: u64, fitness: &[f64], results: &[ResultRecord]) -> Self {
        let displacement: Vec<f64> = results.iter().map(displacement_measure).collect();
        let height: Vec<f64> = results
            .iter()
            .map(max_height_relative_to_avg_height_measure)
            .collect();
        let contact: Vec<f64> = results.iter().map(ground_contact_measure).collect();

        Self {
            generation_index,
            evaluations: results.len(),
            invalid: results.iter().filter(|r| !r.valid).count(),
            fitness: Summary::of(fitness),
            displacement: Summary::of(&displacement),
            displacement_histogram: Histogram::of(&displacement, HISTOGRAM_BINS),
            max_height_relative_to_avg_height_histogram: Histogram::of(&height, HISTOGRAM_BINS),
            ground_contact_histogram: Histogram::of(&contact, HISTOGRAM_BINS),
        }
    }
}

/// Logs a [`GenerationReport`] summary through `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn report(
        &mut self,
        generation_index: u64,
        fitness: &[f64],
        results: &[ResultRecord],
    ) -> Result<()> {
        let report = GenerationReport::from_batch(generation_index, fitness, results);
        let (fitness_min, fitness_max, fitness_avg) = report
            .fitness
            .map_or((f64::NAN, f64::NAN, f64::NAN), |s| (s.min, s.max, s.mean));
        let (displacement_min, displacement_max, displacement_avg) = report
            .displacement
            .map_or((f64::NAN, f64::NAN, f64::NAN), |s| (s.min, s.max, s.mean));

        info!(
            generation = generation_index,
            evaluations = report.evaluations,
            invalid = report.invalid,
            fitness_min,
            fitness_max,
            fitness_avg,
            displacement_min,
            displacement_max,
            displacement_avg,
            "Generation report"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::ActorState;

    fn walked(x: f64) -> ResultRecord {
        let at = |x: f64| ActorState {
            time: 0.0,
            position: [x, 0.0, 0.0],
            orientation: [1.0, 0.0, 0.0, 0.0],
        };
        ResultRecord::new(vec![at(0.0), at(x)])
    }

    #[test]
    fn test_summary_ignores_non_finite() {
        let summary = Summary::of(&[1.0, f64::NAN, 3.0, f64::INFINITY]).unwrap();
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 3.0);
        assert_eq!(summary.mean, 2.0);
        assert!(Summary::of(&[]).is_none());
    }

    #[test]
    fn test_histogram_bins() {
        let histogram = Histogram::of(&[0.0, 1.0, 2.0, 10.0], 10).unwrap();
        assert_eq!(histogram.counts.len(), 10);
        assert_eq!(histogram.counts.iter().sum::<usize>(), 4);
        assert_eq!(histogram.counts[0], 1);
        assert_eq!(histogram.counts[9], 1);

        let flat = Histogram::of(&[2.0, 2.0], 4).unwrap();
        assert_eq!(flat.counts, vec![2, 0, 0, 0]);
    }

    #[test]
    fn test_report_from_batch() {
        let results = vec![walked(1.0), walked(3.0), ResultRecord::failed("crash")];
        let report = GenerationReport::from_batch(4, &[1.0, 3.0, 0.0], &results);

        assert_eq!(report.generation_index, 4);
        assert_eq!(report.evaluations, 3);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.fitness.unwrap().max, 3.0);
        assert_eq!(report.displacement.unwrap().min, 0.0);
    }

    #[test]
    fn test_empty_batch_report() {
        let report = GenerationReport::from_batch(1, &[], &[]);
        assert!(report.fitness.is_none());
        assert!(report.displacement_histogram.is_none());
        assert!(TracingSink.report(1, &[], &[]).is_ok());
    }
}
