use nalgebra::Isometry3;

use crate::collisions::{CollisionQuery, CollisionReport};

/// A trait for a simulated robot body that can check itself for collisions between its links.
///
/// The control loop only depends on this trait, so the same loop can drive the shape-based
/// [`crate::collisions::RobotBody`] or any other model of the robot.
///
/// # Requirements
/// - Implementations of this trait must be `Send` and `Sync`, as the body is shared between
///   the control loop and the viewer thread.
pub trait SelfCollisionDetector: Send + Sync {
    /// Name of the robot.
    fn name(&self) -> &str;

    /// Number of joint values (degrees of freedom) the robot takes.
    fn dof(&self) -> usize;

    /// Checks the robot, posed by `joints`, for collisions between its own links.
    ///
    /// # Arguments
    /// * `joints` - Joint values, one per degree of freedom. Missing values are taken as zero.
    /// * `query` - Whether contact points are needed, or the first colliding pair is enough.
    ///
    /// # Returns
    /// * A fresh [`CollisionReport`]. It is empty if the robot does not collide with itself.
    fn self_collision(&self, joints: &[f64], query: CollisionQuery) -> CollisionReport;

    /// World poses of the named links for the given joint values. Bodies without a
    /// geometric model return nothing.
    fn link_poses(&self, _joints: &[f64]) -> Vec<(String, Isometry3<f64>)> {
        Vec::new()
    }
}
