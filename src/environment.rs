//! Simulation environment: the loaded robot bodies, their joint state and the simulated clock.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::collisions_traits::SelfCollisionDetector;
use crate::robot_state::{RobotState, SharedRobotState};
use crate::scene_error::SceneError;
use crate::urdf;

/// Robot body placed into the environment together with its current joint values.
#[derive(Clone)]
pub struct LoadedBody {
    pub body: Arc<dyn SelfCollisionDetector>,
    pub state: SharedRobotState,
}

/// Kinematic simulation: there are no dynamics, joint values are set from outside and
/// `step` only advances the simulated time.
#[derive(Default)]
pub struct Environment {
    bodies: Vec<LoadedBody>,
    sim_time: f64,
    steps: u64,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads all robots from the model file into a fresh environment.
    /// The environment may end up without bodies.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SceneError> {
        let mut environment = Environment::new();
        for robot in urdf::from_urdf_file(&path)? {
            environment.add_body(Arc::new(robot));
        }
        info!("Loaded {} bodies from {}", environment.bodies.len(), path.as_ref().display());
        Ok(environment)
    }

    /// Adds a body with all joints at zero and returns its index.
    pub fn add_body(&mut self, body: Arc<dyn SelfCollisionDetector>) -> usize {
        let state = RobotState::shared(body.dof());
        self.bodies.push(LoadedBody { body, state });
        self.bodies.len() - 1
    }

    pub fn bodies(&self) -> &[LoadedBody] {
        &self.bodies
    }

    pub fn body(&self, index: usize) -> Option<&LoadedBody> {
        self.bodies.get(index)
    }

    /// Advances the simulated time by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.sim_time += dt;
        self.steps += 1;
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        assert!(matches!(Environment::load("no/such/model.xml"), Err(SceneError::IoError(_))));
    }

    #[test]
    fn test_step_advances_clock() {
        let mut environment = Environment::new();
        environment.step(0.01);
        environment.step(0.01);
        assert_eq!(environment.steps(), 2);
        assert!((environment.sim_time() - 0.02).abs() < 1e-12);
        assert!(environment.body(0).is_none());
    }
}
