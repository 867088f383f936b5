//! Scalar measures extracted from a simulation result.
//!
//! Measures describe a trajectory without judging it; fitness functions and
//! telemetry build on them. Every measure returns `0.0` for a record without
//! states.

use super::simulation::ResultRecord;

/// Height at or below which the actor's reference point counts as touching the ground.
pub const GROUND_CONTACT_HEIGHT: f64 = 0.05;

/// Planar (x, y) distance between the first and the last sampled state.
pub fn displacement_measure(result: &ResultRecord) -> f64 {
    match (result.first_state(), result.last_state()) {
        (Some(first), Some(last)) => {
            let dx = last.position[0] - first.position[0];
            let dy = last.position[1] - first.position[1];
            (dx * dx + dy * dy).sqrt()
        }
        _ => 0.0,
    }
}

/// Progress along the x axis between the first and the last sampled state.
pub fn forward_x_measure(result: &ResultRecord) -> f64 {
    match (result.first_state(), result.last_state()) {
        (Some(first), Some(last)) => last.position[0] - first.position[0],
        _ => 0.0,
    }
}

/// Maximum height reached divided by the average height over the run.
pub fn max_height_relative_to_avg_height_measure(result: &ResultRecord) -> f64 {
    if result.states.is_empty() {
        return 0.0;
    }
    let heights = result.states.iter().map(|s| s.position[2]);
    let max = heights.clone().fold(f64::NEG_INFINITY, f64::max);
    let avg = heights.sum::<f64>() / result.states.len() as f64;
    if avg.abs() < f64::EPSILON {
        0.0
    } else {
        max / avg
    }
}

/// Fraction of samples in which the actor touches the ground.
pub fn ground_contact_measure(result: &ResultRecord) -> f64 {
    if result.states.is_empty() {
        return 0.0;
    }
    let contacts = result
        .states
        .iter()
        .filter(|s| s.position[2] <= GROUND_CONTACT_HEIGHT)
        .count();
    contacts as f64 / result.states.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::simulation::ActorState;

    fn state(time: f64, x: f64, y: f64, z: f64) -> ActorState {
        ActorState {
            time,
            position: [x, y, z],
            orientation: [1.0, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_displacement() {
        let record = ResultRecord::new(vec![
            state(0.0, 0.0, 0.0, 0.1),
            state(1.0, 1.0, 1.0, 0.1),
            state(2.0, 3.0, 4.0, 0.1),
        ]);
        assert!((displacement_measure(&record) - 5.0).abs() < 1e-12);
        assert!((forward_x_measure(&record) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_record_measures_zero() {
        let record = ResultRecord::failed("crashed");
        assert_eq!(displacement_measure(&record), 0.0);
        assert_eq!(max_height_relative_to_avg_height_measure(&record), 0.0);
        assert_eq!(ground_contact_measure(&record), 0.0);
    }

    #[test]
    fn test_height_ratio() {
        let record = ResultRecord::new(vec![
            state(0.0, 0.0, 0.0, 1.0),
            state(1.0, 0.0, 0.0, 2.0),
            state(2.0, 0.0, 0.0, 3.0),
        ]);
        assert!((max_height_relative_to_avg_height_measure(&record) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_ground_contact_fraction() {
        let record = ResultRecord::new(vec![
            state(0.0, 0.0, 0.0, 0.0),
            state(1.0, 0.0, 0.0, 0.5),
            state(2.0, 0.0, 0.0, 0.01),
            state(3.0, 0.0, 0.0, 0.7),
        ]);
        assert!((ground_contact_measure(&record) - 0.5).abs() < 1e-12);
    }
}
