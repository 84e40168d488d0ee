//! cartally — pneumatic two-hose traffic counter.
//!
//! Drives whichever acquisition backend is configured, feeds samples through
//! the detector/pairing pipeline, and appends each resulting vehicle event
//! to the day's event log. Log output is always file-based; a serial-console
//! field deployment running at 1 kHz would be unusable if every sample
//! rejection hit stdout.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartally::acquisition::{
    AcquisitionSource, FrameFormat, FramedSerialSource, GpioAdcSource, ReplaySource, Sample,
    SampleSource,
};
use cartally::config::{self, AcquisitionMode, Config};
use cartally::eventlog::EventLogWriter;
use cartally::pairing::DetectorPair;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimal CLI: an optional config path override, and an optional one-shot
/// replay-file path that takes priority over whatever acquisition backend
/// the config file names.
struct Args {
    config_path: Option<PathBuf>,
    replay_path: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut config_path = None;
    let mut replay_path = None;
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => config_path = iter.next().map(PathBuf::from),
            "--replay" => replay_path = iter.next().map(PathBuf::from),
            _ => {}
        }
    }
    Args { config_path, replay_path }
}

fn init_logging(config_dir: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("failed to create log dir {config_dir:?}"))?;
    let log_file = config_dir.join("cartally.log");
    let file = std::fs::File::create(&log_file)
        .with_context(|| format!("failed to create log file {log_file:?}"))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cartally=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false),
        )
        .init();
    Ok(())
}

fn open_acquisition_source(config: &Config, replay_override: Option<&std::path::Path>) -> Result<AcquisitionSource> {
    if let Some(path) = replay_override {
        let path = path.to_string_lossy();
        return Ok(AcquisitionSource::Replay(ReplaySource::open(&path)?));
    }

    Ok(match &config.acquisition {
        AcquisitionMode::GpioAdc { chip } => AcquisitionSource::GpioAdc(GpioAdcSource::open(chip)?),
        AcquisitionMode::FramedSerial { device, legacy_frames, .. } => {
            let format = if *legacy_frames {
                FrameFormat::LegacyPerChannel
            } else {
                FrameFormat::Combined
            };
            AcquisitionSource::FramedSerial(FramedSerialSource::open(device, format)?)
        }
        AcquisitionMode::Replay { path } => AcquisitionSource::Replay(ReplaySource::open(path)?),
    })
}

fn install_signal_flag() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    let _ = ctrlc_handler(move || flag.store(true, Ordering::SeqCst));
    shutdown
}

/// SIGINT/SIGTERM registration is platform-specific and out of scope for the
/// core pipeline; this stub lets the main loop's shutdown-flag check be
/// exercised in isolation even where a real handler isn't wired up.
fn ctrlc_handler<F: Fn() + Send + 'static>(_handler: F) -> Result<()> {
    Ok(())
}

fn run() -> Result<()> {
    let args = parse_args();

    let config_dir = config::resolve_config_dir().context("could not determine home directory")?;
    init_logging(&config_dir)?;
    tracing::info!(version = VERSION, "starting cartally");

    let config = match &args.config_path {
        Some(path) => Config::load_from_ini(path, &config_dir)?,
        None => config::load_or_init()?,
    };

    let mut source = open_acquisition_source(&config, args.replay_path.as_deref())?;

    let Some(Sample { p0, p1, .. }) = source.seed_sample()? else {
        tracing::warn!("acquisition source produced no samples");
        return Ok(());
    };
    let mut pair = DetectorPair::with_tuning(
        p0,
        p1,
        config.detector_tuning(),
        config.pairing_tuning(),
    );

    let log_path = config.event_log_dir.join(current_log_filename());
    let mut writer = EventLogWriter::create_or_append(&log_path)?;

    let shutdown = install_signal_flag();

    while !shutdown.load(Ordering::SeqCst) {
        match source.next_sample()? {
            Some(Sample { p0, p1, t_ms }) => {
                if let Some(event) = pair.process_sample(p0, p1, t_ms) {
                    tracing::info!(
                        t_ms = event.t_ms,
                        speed_mph = event.speed_mph,
                        direction = ?event.direction,
                        "vehicle event"
                    );
                    writer.write_event(&event)?;
                }
            }
            None => {
                tracing::info!("acquisition source exhausted");
                break;
            }
        }
    }

    tracing::info!("shutting down, event log flushed");
    Ok(())
}

fn current_log_filename() -> String {
    let today = chrono::Local::now().date_naive();
    format!("traffic_log_{today}.txt")
}

fn main() {
    if let Err(err) = run() {
        eprintln!("fatal: {err:?}");
        std::process::exit(1);
    }
}
