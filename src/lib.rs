//! Fixed-rate control loop for a simulated humanoid robot.
//!
//! A robot model (by default the Jaemi Hubo model shipped in `openHubo/`) is loaded into a
//! kinematic simulation. The loop subscribes to the last-value channel `"hubo"` that carries
//! fixed-size joint reference records, applies the newest record to the robot every period,
//! checks the robot for collisions between its own links and reports them in the log.
//!
//! # Features
//!
//! - Last-value channels, in process ([`channel::LocalHub`]) or file backed across processes
//!   ([`file_channel::FileChannel`]). A reader always gets the newest record, never a queue.
//! - Robot models from URDF-style XML with primitive collision geometry (box, cylinder, sphere,
//!   capsule). Forward kinematics over the whole link tree.
//! - Self-collision checks with `parry3d`, link pairs checked in parallel. Adjacent links
//!   and explicitly disabled pairs are skipped.
//! - Absolute deadline timing: the loop does not drift even if a cycle takes time.
//! - Shorter or longer records than the robot's joint count are applied as far as they overlap,
//!   or rejected if so configured.
//! - Optional viewer thread that follows the robot pose while the loop runs.
//!
//! # Example
//!
//! ```no_run
//! use hubo_sim_loop::config::LoopConfig;
//! use hubo_sim_loop::file_channel::{default_channel_dir, FileChannel};
//! use hubo_sim_loop::session::ControlSession;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = LoopConfig::default();
//! let dir = default_channel_dir();
//! let mut session: ControlSession<FileChannel> =
//!     ControlSession::start(config, |name| FileChannel::open(&dir, name)).unwrap();
//! let stats = session.run(&CancellationToken::new()).unwrap();
//! println!("{} cycles", stats.cycles);
//! ```

pub mod record;
pub mod channel;
pub mod file_channel;

pub mod deadline;

pub mod scene_error;
pub mod urdf;
pub mod kinematic_tree;
pub mod joint_body;
pub mod collisions_traits;
pub mod collisions;

pub mod robot_state;
pub mod environment;

pub mod config;
pub mod error;
pub mod report;
pub mod session;

pub mod viewer;

#[cfg(test)]
mod tests;
