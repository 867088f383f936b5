use serde::{Deserialize, Serialize};

/// Timing parameters of a simulation. Fixed for the life of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated seconds per evaluation.
    pub simulation_time: u32,
    /// Samples recorded per simulated second.
    pub sampling_frequency: f64,
    /// Controller updates per simulated second.
    pub control_frequency: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_time: 30,
            sampling_frequency: 10.0,
            control_frequency: 10.0,
        }
    }
}

/// Initial placement of an actor: position and orientation quaternion `[w, x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f64; 3],
    pub orientation: [f64; 4],
}

impl Pose {
    pub fn at(position: [f64; 3]) -> Self {
        Self {
            position,
            orientation: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::at([0.0, 0.0, 0.0])
    }
}

/// One sampled physical state of the simulated actor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorState {
    /// Simulation time of the sample in seconds.
    pub time: f64,
    pub position: [f64; 3],
    pub orientation: [f64; 4],
}

/// The outcome of evaluating one genotype.
///
/// Invalid records still carry whatever states were sampled before the run
/// was rejected; fitness functions decide how to penalize them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultRecord {
    pub states: Vec<ActorState>,
    pub valid: bool,
    pub failure: Option<String>,
}

impl ResultRecord {
    /// A valid record holding `states`.
    pub fn new(states: Vec<ActorState>) -> Self {
        Self {
            states,
            valid: true,
            failure: None,
        }
    }

    /// An invalid record with no states, for runs that never produced output.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            states: Vec::new(),
            valid: false,
            failure: Some(reason.into()),
        }
    }

    /// Marks this record invalid, keeping its states.
    pub fn invalidate(mut self, reason: impl Into<String>) -> Self {
        self.valid = false;
        self.failure = Some(reason.into());
        self
    }

    pub fn first_state(&self) -> Option<&ActorState> {
        self.states.first()
    }

    pub fn last_state(&self) -> Option<&ActorState> {
        self.states.last()
    }
}
