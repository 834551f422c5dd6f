use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hubo_sim_loop::channel::{LastValueChannel, LocalHub};
use hubo_sim_loop::config::{LoopConfig, MismatchPolicy, Verbosity};
use hubo_sim_loop::error::LoopError;
use hubo_sim_loop::file_channel::{default_channel_dir, FileChannel};
use hubo_sim_loop::record::{encode_record, record_size, HuboRef};
use hubo_sim_loop::session::ControlSession;
use hubo_sim_loop::viewer::spawn_viewer;

/// Drives the simulated Hubo from the joint reference channel and reports self-collisions.
#[derive(Parser, Debug)]
#[command(name = "hubo-sim", ignore_errors = true, disable_version_flag = true)]
struct Args {
    /// Start the viewer thread
    #[arg(short = 'g', long = "viewer")]
    viewer: bool,

    /// Log one line per cycle in collision
    #[arg(short = 'v')]
    summary: bool,

    /// Log every contact with its position and normal
    #[arg(short = 'V')]
    contacts: bool,

    /// Run a single cycle, print the collision summary and exit
    #[arg(long)]
    once: bool,

    /// Name of the reference channel
    #[arg(long)]
    channel: Option<String>,

    /// Directory holding file channels
    #[arg(long)]
    channel_dir: Option<PathBuf>,

    /// Use an in-process channel fed by a built-in demo producer
    #[arg(long)]
    local: bool,

    /// Polling period, seconds
    #[arg(long)]
    period: Option<f64>,

    /// Simulation step per cycle, seconds
    #[arg(long)]
    step: Option<f64>,

    /// YAML configuration file, command line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Refuse to run if the record and the robot have different joint counts
    #[arg(long)]
    strict_joints: bool,

    /// Robot model
    model: Option<PathBuf>,
}

fn build_config(args: &Args) -> Result<LoopConfig, LoopError> {
    let mut config = match &args.config {
        Some(path) => LoopConfig::from_yaml_file(path)?,
        None => LoopConfig::default(),
    };
    if let Some(channel) = &args.channel {
        config.channel = channel.clone();
    }
    if let Some(dir) = &args.channel_dir {
        config.channel_dir = Some(dir.clone());
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(period) = args.period {
        config.period = Duration::try_from_secs_f64(period)
            .map_err(|_| LoopError::InvalidConfig(format!("period {} is not a valid duration", period)))?;
    }
    if let Some(step) = args.step {
        config.step = step;
    }
    if args.contacts {
        config.verbosity = Verbosity::Contacts;
    } else if args.summary {
        config.verbosity = Verbosity::Summary;
    }
    if args.viewer {
        config.viewer = true;
    }
    if args.strict_joints {
        config.joint_mismatch = MismatchPolicy::Reject;
    }
    Ok(config)
}

fn drive<C: LastValueChannel>(
    mut session: ControlSession<C>,
    once: bool,
    token: &CancellationToken,
) -> Result<(), LoopError> {
    if once {
        let summary = session.check_once()?;
        println!("{}", summary);
        return Ok(());
    }

    let viewer = if session.config().viewer {
        match spawn_viewer(session.robot().clone(), session.config().viewer_period, token.clone()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("Viewer not started: {}", err);
                None
            }
        }
    } else {
        None
    };

    let result = session.run(token);
    token.cancel();
    if let Some(handle) = viewer {
        if handle.join().is_err() {
            warn!("Viewer thread panicked");
        }
    }

    let stats = result?;
    info!("{} cycles, {} overruns, {} in self-collision", stats.cycles, stats.overruns, stats.colliding_cycles);
    Ok(())
}

/// Publishes slow sine waves on an in-process channel until cancelled.
fn spawn_demo_producer(hub: &LocalHub, name: &str, token: CancellationToken) -> std::io::Result<()> {
    let mut channel = hub.create(name, record_size::<HuboRef>());
    // First record before the loop starts, so that a single check has something to apply.
    if let Err(err) = channel.publish(encode_record(&HuboRef::sine_wave(0.0, 0.3, 0.2))) {
        warn!("Demo producer: {}", err);
    }
    thread::Builder::new()
        .name("demo-producer".into())
        .spawn(move || {
            let started = Instant::now();
            while !token.is_cancelled() {
                let record = HuboRef::sine_wave(started.elapsed().as_secs_f64(), 0.3, 0.2);
                if let Err(err) = channel.publish(encode_record(&record)) {
                    warn!("Demo producer stopped: {}", err);
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
        })?;
    Ok(())
}

fn run(args: &Args, token: &CancellationToken) -> Result<(), LoopError> {
    let config = build_config(args)?;

    if args.local {
        let hub = LocalHub::new();
        if let Err(err) = spawn_demo_producer(&hub, &config.channel, token.clone()) {
            warn!("Demo producer not started: {}", err);
        }
        let session: ControlSession<_> = ControlSession::start(config, |name| hub.open(name))?;
        drive(session, args.once, token)
    } else {
        let dir = config.channel_dir.clone().unwrap_or_else(default_channel_dir);
        let session: ControlSession<FileChannel> = ControlSession::start(config, |name| FileChannel::open(&dir, name))?;
        drive(session, args.once, token)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?,
        )
        .init();

    let args = Args::parse();

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    if let Err(err) = run(&args, &token) {
        error!("{}", err);
        std::process::exit(err.exit_code());
    }
    Ok(())
}
