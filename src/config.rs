//! Loop configuration: defaults, optional YAML file, validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use yaml_rust2::{Yaml, YamlLoader};

use crate::error::LoopError;
use crate::record::HUBO_CHAN_REF_NAME;

/// Longest accepted polling or viewer period.
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 3600);

/// Default robot model.
pub const DEFAULT_MODEL: &str = "openHubo/jaemiHubo.robot.xml";

/// How much the loop logs about detected self-collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Collisions only at debug level
    #[default]
    Quiet,
    /// One line per colliding cycle
    Summary,
    /// One line per contact, with position and normal
    Contacts,
}

/// What to do when the record and the robot have different joint counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Apply the overlapping prefix
    #[default]
    Truncate,
    /// Refuse to start
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Name of the reference channel
    pub channel: String,
    /// Directory of file channels, `None` for the platform default
    pub channel_dir: Option<PathBuf>,
    pub model: PathBuf,
    /// Wall clock polling period
    pub period: Duration,
    /// Simulated time step per cycle, in seconds
    pub step: f64,
    pub verbosity: Verbosity,
    pub viewer: bool,
    pub viewer_period: Duration,
    /// Request contact points from the collision query, not only the first colliding pair.
    /// Always on with [`Verbosity::Contacts`].
    pub contact_details: bool,
    pub joint_mismatch: MismatchPolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            channel: HUBO_CHAN_REF_NAME.to_string(),
            channel_dir: None,
            model: PathBuf::from(DEFAULT_MODEL),
            period: Duration::from_millis(10),
            step: 0.01,
            verbosity: Verbosity::Quiet,
            viewer: false,
            viewer_period: Duration::from_millis(500),
            contact_details: true,
            joint_mismatch: MismatchPolicy::Truncate,
        }
    }
}

impl LoopConfig {
    /// Read the configuration from YAML file. Keys that are not present keep their defaults:
    /// ```yaml
    /// channel: hubo
    /// channel_dir: /dev/shm
    /// model: openHubo/jaemiHubo.robot.xml
    /// period: 0.05        # seconds
    /// step: 0.05          # seconds
    /// verbosity: contacts # quiet, summary or contacts
    /// viewer: true
    /// viewer_period: 1.0
    /// contact_details: true
    /// joint_mismatch: reject # truncate or reject
    /// ```
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, LoopError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LoopError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, LoopError> {
        let docs = YamlLoader::load_from_str(contents)
            .map_err(|e| LoopError::InvalidConfig(format!("YAML: {}", e)))?;
        let mut config = LoopConfig::default();
        let Some(doc) = docs.first() else {
            return Ok(config);
        };
        if doc.as_hash().is_none() {
            return Err(LoopError::InvalidConfig("top level must be a mapping".into()));
        }

        if let Some(channel) = string(doc, "channel")? {
            config.channel = channel;
        }
        if let Some(dir) = string(doc, "channel_dir")? {
            config.channel_dir = Some(PathBuf::from(dir));
        }
        if let Some(model) = string(doc, "model")? {
            config.model = PathBuf::from(model);
        }
        if let Some(period) = seconds(doc, "period")? {
            config.period = duration(period, "period")?;
        }
        if let Some(step) = seconds(doc, "step")? {
            config.step = step;
        }
        if let Some(verbosity) = string(doc, "verbosity")? {
            config.verbosity = match verbosity.as_str() {
                "quiet" => Verbosity::Quiet,
                "summary" => Verbosity::Summary,
                "contacts" => Verbosity::Contacts,
                other => return Err(LoopError::InvalidConfig(format!("unknown verbosity {}", other))),
            };
        }
        if let Some(viewer) = boolean(doc, "viewer")? {
            config.viewer = viewer;
        }
        if let Some(period) = seconds(doc, "viewer_period")? {
            config.viewer_period = duration(period, "viewer_period")?;
        }
        if let Some(details) = boolean(doc, "contact_details")? {
            config.contact_details = details;
        }
        if let Some(policy) = string(doc, "joint_mismatch")? {
            config.joint_mismatch = match policy.as_str() {
                "truncate" => MismatchPolicy::Truncate,
                "reject" => MismatchPolicy::Reject,
                other => return Err(LoopError::InvalidConfig(format!("unknown joint_mismatch {}", other))),
            };
        }

        Ok(config)
    }

    /// Checks values the loop cannot run with.
    pub fn validate(&self) -> Result<(), LoopError> {
        if self.period.is_zero() || self.period > MAX_PERIOD {
            return Err(LoopError::InvalidConfig(format!(
                "period must be positive and at most {} s, got {:?}", MAX_PERIOD.as_secs(), self.period)));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(LoopError::InvalidConfig(format!("step must be positive, got {}", self.step)));
        }
        if self.viewer && (self.viewer_period.is_zero() || self.viewer_period > MAX_PERIOD) {
            return Err(LoopError::InvalidConfig(format!(
                "viewer_period must be positive and at most {} s, got {:?}", MAX_PERIOD.as_secs(), self.viewer_period)));
        }
        if self.channel.is_empty() {
            return Err(LoopError::InvalidConfig("channel name is empty".into()));
        }
        Ok(())
    }

    /// True if the simulated step does not match the polling period.
    pub fn step_mismatch(&self) -> bool {
        (self.period.as_secs_f64() - self.step).abs() > 1e-9
    }
}

fn string(doc: &Yaml, key: &str) -> Result<Option<String>, LoopError> {
    let value = &doc[key];
    if value.is_badvalue() {
        return Ok(None);
    }
    value.as_str()
        .map(|s| Some(s.to_string()))
        .ok_or_else(|| LoopError::InvalidConfig(format!("{} must be a string", key)))
}

fn seconds(doc: &Yaml, key: &str) -> Result<Option<f64>, LoopError> {
    let value = &doc[key];
    if value.is_badvalue() {
        return Ok(None);
    }
    value.as_f64()
        .or_else(|| value.as_i64().map(|i| i as f64))
        .map(Some)
        .ok_or_else(|| LoopError::InvalidConfig(format!("{} must be a number of seconds", key)))
}

fn boolean(doc: &Yaml, key: &str) -> Result<Option<bool>, LoopError> {
    let value = &doc[key];
    if value.is_badvalue() {
        return Ok(None);
    }
    value.as_bool()
        .map(Some)
        .ok_or_else(|| LoopError::InvalidConfig(format!("{} must be true or false", key)))
}

fn duration(seconds: f64, key: &str) -> Result<Duration, LoopError> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| LoopError::InvalidConfig(format!("{} must be a non-negative number of seconds", key)))
}
