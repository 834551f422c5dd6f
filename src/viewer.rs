//! Headless pose monitor: a thread that periodically reads the shared joint state of the
//! driven robot and logs where its links are.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::deadline::Deadline;
use crate::environment::LoadedBody;

/// One observation of the robot.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    /// Number of state updates seen so far
    pub updates: u64,
    pub joints: Vec<f64>,
    /// Link name and world translation
    pub links: Vec<(String, [f64; 3])>,
}

/// Copies the state under the read lock, then computes link poses outside of it.
pub fn observe(robot: &LoadedBody) -> PoseFrame {
    let (updates, joints) = {
        let state = robot.state.read().unwrap_or_else(|e| e.into_inner());
        (state.updates(), state.values().to_vec())
    };
    let links = robot.body.link_poses(&joints).into_iter()
        .map(|(name, pose)| {
            let t = pose.translation.vector;
            (name, [t.x, t.y, t.z])
        })
        .collect();
    PoseFrame { updates, joints, links }
}

/// Starts the viewer thread. It stops once `token` is cancelled and returns the number of
/// frames it observed.
pub fn spawn_viewer(robot: LoadedBody, period: Duration, token: CancellationToken) -> io::Result<JoinHandle<u64>> {
    thread::Builder::new()
        .name("viewer".into())
        .spawn(move || {
            let mut frames = 0;
            let mut deadline = Deadline::now();
            while !token.is_cancelled() {
                let frame = observe(&robot);
                for (name, [x, y, z]) in &frame.links {
                    debug!("{:>16}: [{:.3}, {:.3}, {:.3}]", name, x, y, z);
                }
                info!(
                    "{}: {} updates, {} joints, {} links",
                    robot.body.name(), frame.updates, frame.joints.len(), frame.links.len()
                );
                frames += 1;
                deadline.advance(period);
                deadline.sleep_until();
            }
            frames
        })
}
