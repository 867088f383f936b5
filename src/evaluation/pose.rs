use super::simulation::Pose;

/// Chooses where a developed body starts its simulation.
pub trait PoseStrategy<B>: Send + Sync {
    fn initial_pose(&self, body: &B) -> Pose;
}

/// Places every body at the origin with identity orientation.
#[derive(Debug, Clone, Copy, Default)]
pub struct OriginPose;

impl<B> PoseStrategy<B> for OriginPose {
    fn initial_pose(&self, _body: &B) -> Pose {
        Pose::default()
    }
}

/// Places every body at a fixed height above the origin.
#[derive(Debug, Clone, Copy)]
pub struct StandingPose {
    pub height: f64,
}

impl<B> PoseStrategy<B> for StandingPose {
    fn initial_pose(&self, _body: &B) -> Pose {
        Pose::at([0.0, 0.0, self.height])
    }
}

impl<B, F> PoseStrategy<B> for F
where
    F: Fn(&B) -> Pose + Send + Sync,
{
    fn initial_pose(&self, body: &B) -> Pose {
        self(body)
    }
}
