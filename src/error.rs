//! Errors that end the control loop, and the process exit codes they map to.

use std::fmt;

use crate::channel::ChannelError;
use crate::scene_error::SceneError;

#[derive(Debug)]
pub enum LoopError {
    /// The named channel could not be opened.
    ChannelOpenFailed { name: String, source: ChannelError },
    /// A frame does not have the size of the record.
    RecordSizeMismatch { expected: usize, found: usize },
    /// The model file could not be read or interpreted.
    SceneLoadFailed { path: String, source: SceneError },
    /// The model file holds no robot.
    NoBodiesLoaded { path: String },
    /// Reading the channel failed after it was opened.
    Channel(ChannelError),
    /// The record and the robot disagree on the joint count, and this is not tolerated.
    JointCountMismatch { record: usize, robot: usize },
    InvalidConfig(String),
}

impl LoopError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoopError::ChannelOpenFailed { .. } => 1,
            LoopError::SceneLoadFailed { .. } => 2,
            LoopError::NoBodiesLoaded { .. } => -3,
            LoopError::RecordSizeMismatch { .. } => 4,
            LoopError::Channel(_) => 5,
            LoopError::JointCountMismatch { .. } => 6,
            LoopError::InvalidConfig(_) => 7,
        }
    }
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoopError::ChannelOpenFailed { ref name, ref source } =>
                write!(f, "Failed to open channel {}: {}", name, source),
            LoopError::RecordSizeMismatch { expected, found } =>
                write!(f, "Record size mismatch: expected {} bytes, found {}", expected, found),
            LoopError::SceneLoadFailed { ref path, ref source } =>
                write!(f, "Failed to load {}: {}", path, source),
            LoopError::NoBodiesLoaded { ref path } =>
                write!(f, "No bodies loaded from {}", path),
            LoopError::Channel(ref err) =>
                write!(f, "Channel fault: {}", err),
            LoopError::JointCountMismatch { record, robot } =>
                write!(f, "Record carries {} joints, robot has {}", record, robot),
            LoopError::InvalidConfig(ref msg) =>
                write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for LoopError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoopError::ChannelOpenFailed { source, .. } => Some(source),
            LoopError::SceneLoadFailed { source, .. } => Some(source),
            LoopError::Channel(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChannelError> for LoopError {
    fn from(err: ChannelError) -> Self {
        LoopError::Channel(err)
    }
}
