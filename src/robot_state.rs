//! Joint values of a loaded robot, shared between the control loop and the viewer.

use std::sync::{Arc, RwLock};

/// Current joint values of a robot body.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    values: Vec<f64>,
    updates: u64,
}

/// State of one body, written by the control loop and read by the viewer.
pub type SharedRobotState = Arc<RwLock<RobotState>>;

impl RobotState {
    /// All joints at zero.
    pub fn new(dof: usize) -> Self {
        RobotState { values: vec![0.0; dof], updates: 0 }
    }

    pub fn shared(dof: usize) -> SharedRobotState {
        Arc::new(RwLock::new(Self::new(dof)))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn dof(&self) -> usize {
        self.values.len()
    }

    /// Number of times [`Self::apply_prefix`] was called.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Copies `reference` into the joint values index by index. Only the overlapping prefix
    /// is written, joints beyond it keep their values. Returns the number of joints written.
    pub fn apply_prefix(&mut self, reference: &[f64]) -> usize {
        let n = reference.len().min(self.values.len());
        self.values[..n].copy_from_slice(&reference[..n]);
        self.updates += 1;
        n
    }
}
