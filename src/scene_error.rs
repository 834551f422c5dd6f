//! Error handling for robot model loading

use std::io;

/// Unified error to report failures while reading and interpreting a robot model file.
#[derive(Debug)]
pub enum SceneError {
    IoError(io::Error),
    XmlProcessingError(String),
    ParseError(String),
    MissingField(String),
    WrongAngle(String),
    UnknownLink { joint: String, link: String },
    InvalidLength { expected: usize, found: usize },
    StructureError(String),
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            SceneError::IoError(ref err) =>
                write!(f, "IO Error: {}", err),
            SceneError::XmlProcessingError(ref err) =>
                write!(f, "XML Processing Error: {}", err),
            SceneError::ParseError(ref msg) =>
                write!(f, "Parse Error: {}", msg),
            SceneError::MissingField(ref field) =>
                write!(f, "Missing Field: {}", field),
            SceneError::WrongAngle(ref msg) =>
                write!(f, "Wrong angle representation: {}", msg),
            SceneError::UnknownLink { ref joint, ref link } =>
                write!(f, "Joint {} refers to unknown link {}", joint, link),
            SceneError::InvalidLength { expected, found } =>
                write!(f, "Invalid Length: expected {}, found {}", expected, found),
            SceneError::StructureError(ref err) =>
                write!(f, "Kinematic Structure Error: {}", err),
        }
    }
}

impl std::error::Error for SceneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SceneError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SceneError {
    fn from(err: io::Error) -> Self {
        SceneError::IoError(err)
    }
}
