//! The control loop: polls the reference channel, drives the first loaded robot with the
//! newest record, checks it for self-collisions and advances the simulated clock.

use std::marker::PhantomData;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, GetMode, LastValueChannel};
use crate::collisions::{CollisionQuery, CollisionSummary};
use crate::config::{LoopConfig, MismatchPolicy, Verbosity};
use crate::deadline::Deadline;
use crate::environment::{Environment, LoadedBody};
use crate::error::LoopError;
use crate::record::{decode_record, record_size, HuboRef, JointRecord};
use crate::report::log_report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Running,
    Stopped,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Sequence number of the applied frame, `None` if nothing was published yet.
    pub seq: Option<u64>,
    /// Number of joints written to the robot state.
    pub joints_applied: usize,
    pub collision: CollisionSummary,
}

impl CycleOutcome {
    pub fn sample_applied(&self) -> bool {
        self.seq.is_some()
    }
}

/// Timing statistics of [`ControlSession::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u64,
    /// Cycles after which the next deadline had already passed
    pub overruns: u64,
    /// Largest delay between a deadline and the actual wake up, nanoseconds
    pub max_latency_ns: i64,
    /// Cycles where the robot was found in self-collision
    pub colliding_cycles: u64,
}

/// Opens the named channel with `open`, reporting any failure as [`LoopError::ChannelOpenFailed`].
pub fn open_channel<C, F>(name: &str, open: F) -> Result<C, LoopError>
where
    F: FnOnce(&str) -> Result<C, ChannelError>,
{
    open(name).map_err(|source| LoopError::ChannelOpenFailed { name: name.to_string(), source })
}

/// Loads the model into a fresh environment. A model without robots is an error here.
pub fn load_environment(model: &Path) -> Result<Environment, LoopError> {
    let path = model.display().to_string();
    let environment = Environment::load(model)
        .map_err(|source| LoopError::SceneLoadFailed { path: path.clone(), source })?;
    if environment.bodies().is_empty() {
        return Err(LoopError::NoBodiesLoaded { path });
    }
    Ok(environment)
}

/// Session owning the channel and the environment. `R` is the record type carried
/// by the channel.
pub struct ControlSession<C: LastValueChannel, R: JointRecord = HuboRef> {
    config: LoopConfig,
    channel: C,
    environment: Environment,
    robot: LoadedBody,
    query: CollisionQuery,
    state: SessionState,
    record: PhantomData<R>,
}

impl<C: LastValueChannel, R: JointRecord> ControlSession<C, R> {
    /// Validates the configuration, opens the channel and loads the model named in the
    /// configuration. The first robot of the model is driven.
    pub fn start<F>(config: LoopConfig, open: F) -> Result<Self, LoopError>
    where
        F: FnOnce(&str) -> Result<C, ChannelError>,
    {
        config.validate()?;
        let channel = open_channel(&config.channel, open)?;
        let environment = load_environment(&config.model)?;
        Self::assemble(config, channel, environment)
    }

    /// Like [`Self::start`], but drives an environment prepared by the caller.
    pub fn with_environment<F>(config: LoopConfig, open: F, environment: Environment) -> Result<Self, LoopError>
    where
        F: FnOnce(&str) -> Result<C, ChannelError>,
    {
        config.validate()?;
        let channel = open_channel(&config.channel, open)?;
        Self::assemble(config, channel, environment)
    }

    fn assemble(config: LoopConfig, channel: C, environment: Environment) -> Result<Self, LoopError> {
        let Some(robot) = environment.body(0).cloned() else {
            return Err(LoopError::NoBodiesLoaded { path: config.model.display().to_string() });
        };
        if environment.bodies().len() > 1 {
            info!("Model holds {} robots, driving {}", environment.bodies().len(), robot.body.name());
        }

        if config.step_mismatch() {
            warn!(
                "Simulation step {} s differs from polling period {} s, simulated time will not follow wall time",
                config.step, config.period.as_secs_f64()
            );
        }

        let record_joints = R::joint_count();
        let robot_joints = robot.body.dof();
        if record_joints != robot_joints {
            match config.joint_mismatch {
                MismatchPolicy::Truncate => warn!(
                    "Record carries {} joints, robot {} has {}: only the first {} are applied",
                    record_joints, robot.body.name(), robot_joints, record_joints.min(robot_joints)
                ),
                MismatchPolicy::Reject => {
                    return Err(LoopError::JointCountMismatch { record: record_joints, robot: robot_joints });
                }
            }
        }

        // Per contact logging needs contact points even if details are off
        let query = if config.contact_details || config.verbosity == Verbosity::Contacts {
            CollisionQuery::Contacts
        } else {
            CollisionQuery::FirstHit
        };
        info!(
            "Driving {} ({} joints) from channel {} every {:?}",
            robot.body.name(), robot_joints, channel.name(), config.period
        );

        Ok(ControlSession {
            config,
            channel,
            environment,
            robot,
            query,
            state: SessionState::Initializing,
            record: PhantomData,
        })
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The driven robot together with its shared state.
    pub fn robot(&self) -> &LoadedBody {
        &self.robot
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Copy of the current joint values of the driven robot.
    pub fn joint_values(&self) -> Vec<f64> {
        self.robot.state.read().unwrap_or_else(|e| e.into_inner()).values().to_vec()
    }

    /// Runs one cycle without sleeping: fetch, apply, check, log, step.
    /// Any error stops the session.
    pub fn cycle(&mut self) -> Result<CycleOutcome, LoopError> {
        let outcome = self.cycle_inner();
        if outcome.is_err() {
            self.state = SessionState::Stopped;
        }
        outcome
    }

    fn cycle_inner(&mut self) -> Result<CycleOutcome, LoopError> {
        let sample = match self.channel.get(GetMode::Last) {
            Ok(frame) => {
                let record = decode_record::<R>(&frame.bytes).map_err(|found| {
                    LoopError::RecordSizeMismatch { expected: record_size::<R>(), found }
                })?;
                Some((frame.seq, record))
            }
            Err(ChannelError::Empty) => None,
            Err(err) => return Err(LoopError::Channel(err)),
        };

        let (seq, joints_applied, snapshot) = {
            let mut state = self.robot.state.write().unwrap_or_else(|e| e.into_inner());
            match &sample {
                Some((seq, record)) => {
                    let applied = state.apply_prefix(record.reference());
                    (Some(*seq), applied, state.values().to_vec())
                }
                None => (None, 0, state.values().to_vec()),
            }
        };
        if seq.is_none() {
            debug!("Nothing published on {} yet", self.channel.name());
        }

        let report = self.robot.body.self_collision(&snapshot, self.query);
        log_report(&report, self.config.verbosity);

        self.environment.step(self.config.step);
        Ok(CycleOutcome { seq, joints_applied, collision: report.summary() })
    }

    /// Runs at the configured period until `token` is cancelled or a cycle fails.
    pub fn run(&mut self, token: &CancellationToken) -> Result<CycleStats, LoopError> {
        self.state = SessionState::Running;
        let mut stats = CycleStats::default();
        let mut deadline = Deadline::now();
        while !token.is_cancelled() {
            deadline.sleep_until();
            let latency = Deadline::now().diff_ns(&deadline);
            stats.max_latency_ns = stats.max_latency_ns.max(latency);

            let outcome = self.cycle()?;
            stats.cycles += 1;
            if outcome.collision.in_collision {
                stats.colliding_cycles += 1;
            }

            deadline.advance(self.config.period);
            if deadline < Deadline::now() {
                stats.overruns += 1;
                debug!("Cycle {} overran its period", stats.cycles);
            }
        }
        self.state = SessionState::Stopped;
        info!(
            "Stopped after {} cycles ({} overruns, max latency {} us), simulated time {:.3} s",
            stats.cycles, stats.overruns, stats.max_latency_ns / 1000, self.environment.sim_time()
        );
        Ok(stats)
    }

    /// Runs exactly `cycles` cycles at the configured period.
    pub fn run_cycles(&mut self, cycles: u64) -> Result<CycleStats, LoopError> {
        self.state = SessionState::Running;
        let mut stats = CycleStats::default();
        let mut deadline = Deadline::now();
        for _ in 0..cycles {
            deadline.sleep_until();
            stats.max_latency_ns = stats.max_latency_ns.max(Deadline::now().diff_ns(&deadline));
            if self.cycle()?.collision.in_collision {
                stats.colliding_cycles += 1;
            }
            stats.cycles += 1;
            deadline.advance(self.config.period);
            if deadline < Deadline::now() {
                stats.overruns += 1;
            }
        }
        self.state = SessionState::Stopped;
        Ok(stats)
    }

    /// Single cycle without any sleep, for headless checks.
    pub fn check_once(&mut self) -> Result<CollisionSummary, LoopError> {
        let outcome = self.cycle()?;
        self.state = SessionState::Stopped;
        Ok(outcome.collision)
    }
}
