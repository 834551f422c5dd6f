//! Publishes Hubo joint references on a file channel, to drive `hubo-sim` from another process.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hubo_sim_loop::channel::LastValueChannel;
use hubo_sim_loop::deadline::Deadline;
use hubo_sim_loop::file_channel::{default_channel_dir, FileChannel};
use hubo_sim_loop::record::{encode_record, HuboRef, HUBO_CHAN_REF_NAME};

#[derive(Parser, Debug)]
#[command(name = "hubo-publish", about = "Publishes sine wave joint references for hubo-sim")]
struct Args {
    /// Name of the reference channel
    #[arg(long, default_value = HUBO_CHAN_REF_NAME)]
    channel: String,

    /// Directory holding file channels
    #[arg(long)]
    channel_dir: Option<PathBuf>,

    /// Publishing rate, Hz
    #[arg(long, default_value_t = 100.0)]
    rate: f64,

    /// Amplitude of the joint motion, radians
    #[arg(long, default_value_t = 0.3)]
    amplitude: f64,

    /// Frequency of the joint motion, Hz
    #[arg(long, default_value_t = 0.2)]
    frequency: f64,

    /// Stop after this many records (0 publishes until Ctrl-C)
    #[arg(long, default_value_t = 0)]
    count: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?,
        )
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.rate > 0.0 && args.rate.is_finite(), "rate must be positive");
    let period = Duration::from_secs_f64(1.0 / args.rate);

    let dir = args.channel_dir.clone().unwrap_or_else(default_channel_dir);
    let mut channel = FileChannel::create(&dir, &args.channel)
        .with_context(|| format!("Failed to create channel {} in {}", args.channel, dir.display()))?;
    info!("Publishing on {} at {} Hz", channel.path().display(), args.rate);

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    let started = Instant::now();
    let mut deadline = Deadline::now();
    let mut published = 0u64;
    while !token.is_cancelled() && (args.count == 0 || published < args.count) {
        let record = HuboRef::sine_wave(started.elapsed().as_secs_f64(), args.amplitude, args.frequency);
        channel.publish(encode_record(&record)).context("Failed to publish")?;
        published += 1;
        deadline.advance(period);
        deadline.sleep_until();
    }
    info!("Published {} records", published);
    Ok(())
}
