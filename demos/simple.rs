// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use rate_stack_tracker::{
    config::TrackerConfig,
    reporter::{local::LocalReporter, writer::WriterReporter},
    sync::SyncTracker,
    tracker::{TrackerBuilder, TrackerHandle},
    TrackCall,
};
use std::time::{Duration, Instant};

use clap::Parser;
use rand::Rng;

pub fn set_up_tracing() {
    use tracing_subscriber::{prelude::*, EnvFilter};

    let format = tracing_subscriber::fmt::layer().pretty();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(format)
        .with(filter)
        .init();
}

/// Drives a synthetic hot path whose call rate spikes and subsides
#[derive(Parser, Debug)]
struct Args {
    /// Write reports into this directory instead of stdout
    #[arg(long)]
    local: Option<String>,
    /// Use the single-threaded tracker
    #[arg(long, conflicts_with = "local")]
    sync: bool,
    #[arg(long, default_value = "1s")]
    #[clap(value_parser = humantime::parse_duration)]
    check_interval: Duration,
    #[arg(long, default_value = "5s")]
    #[clap(value_parser = humantime::parse_duration)]
    report_interval: Duration,
    #[arg(long, default_value_t = 5000.0)]
    start_rate: f64,
    #[arg(long, default_value_t = 4000.0)]
    stop_rate: f64,
    #[arg(long, default_value_t = 100)]
    capture_modulus: u64,
    /// How long each phase of the load pattern lasts
    #[arg(long, default_value = "10s")]
    #[clap(value_parser = humantime::parse_duration)]
    phase: Duration,
}

#[inline(never)]
fn handle_request(tracker: &mut impl TrackCall) {
    tracker.track_call(Instant::now());
}

#[inline(never)]
fn read_path(tracker: &mut impl TrackCall) {
    handle_request(tracker);
}

#[inline(never)]
fn write_path(tracker: &mut impl TrackCall) {
    handle_request(tracker);
}

/// Calls the hot path `rate` times per second for `duration`.
async fn load(tracker: &mut impl TrackCall, rate: u32, duration: Duration) {
    let mut ticker = tokio::time::interval(Duration::from_millis(10));
    let per_tick = rate / 100;
    let end = Instant::now() + duration;
    while Instant::now() < end {
        ticker.tick().await;
        for _ in 0..per_tick {
            // reads are three times hotter than writes
            if rand::rng().random_ratio(3, 4) {
                read_path(tracker);
            } else {
                write_path(tracker);
            }
        }
    }
}

async fn run(tracker: &mut impl TrackCall, phase: Duration) {
    tracing::info!("quiet phase");
    load(tracker, 1_000, phase).await;
    tracing::info!("spike");
    load(tracker, 20_000, phase).await;
    tracing::info!("quiet phase");
    load(tracker, 1_000, phase).await;
}

pub fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(main_internal(args))
}

async fn main_internal(args: Args) -> Result<(), anyhow::Error> {
    set_up_tracing();
    tracing::info!("main started");

    let config = TrackerConfig::builder()
        .with_check_interval(args.check_interval)
        .with_report_interval(args.report_interval)
        .with_start_rate(args.start_rate)
        .with_stop_rate(args.stop_rate)
        .with_capture_modulus(args.capture_modulus)
        .build()?;

    if args.sync {
        let mut tracker = SyncTracker::new(config, std::io::stdout());
        run(&mut tracker, args.phase).await;
        return Ok(());
    }

    let builder = TrackerBuilder::default().with_config(config);
    let builder = match args.local {
        Some(local) => builder.with_reporter(LocalReporter::new(local)),
        None => builder.with_reporter(WriterReporter::stdout()),
    };
    let mut tracker: TrackerHandle = builder.build().spawn();
    tracing::info!("tracker started");

    run(&mut tracker, args.phase).await;
    tracker.shutdown().await;
    tracing::info!(calls = tracker.call_count(), dropped = tracker.dropped_traces(), "done");

    Ok(())
}
