//! tensile-daq - headless acquisition run
//!
//! Loads the rig configuration, drives one calibrated run against the
//! simulated device and logs a summary of the resulting series.
//!
//! Usage: `tensile-daq [CONFIG]` (defaults to the app data directory)

use anyhow::Context;
use std::path::PathBuf;
use tensile_daq::{
    backend::{AcquisitionEvent, AcquisitionLoop, SignalPattern, SimulatedDaq},
    config::{AppConfig, LoggingConfig},
    types::{AcquisitionStats, ChannelRole, CrossSection, SpecimenGeometry, UnitSystem},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ticks sampled before the run is paused
const DEMO_TICKS: u32 = 20;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(AppConfig::default_path);
    let config = match &config_path {
        Some(path) if path.exists() => AppConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        _ => AppConfig::default(),
    };

    let _log_guard = init_logging(&config.logging);
    tracing::info!(
        "Starting tensile-daq at {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(path) = &config_path {
        tracing::debug!("Config path: {}", path.display());
    }

    let geometry = match config.specimen_geometry() {
        Some(geometry) => geometry?,
        None => SpecimenGeometry::from_section(
            CrossSection::Rectangular {
                width: 0.5,
                depth: 0.25,
            },
            2.0,
            UnitSystem::English,
        )?,
    };

    let device = SimulatedDaq::from_hardware_config(&config.hardware)
        .with_pattern(
            ChannelRole::Force,
            SignalPattern::Ramp {
                start: 0.02,
                slope: 0.05,
            },
        )
        .with_pattern(
            ChannelRole::Elongation,
            SignalPattern::Ramp {
                start: 0.01,
                slope: 0.2,
            },
        )
        .with_noise(ChannelRole::Force, 0.001);

    let mut daq = AcquisitionLoop::new(Box::new(device), config.acquisition.clone());
    daq.configure(config.channels.clone())
        .context("configuring channels")?;
    daq.set_unit_system(config.units, false)?;
    daq.set_geometry(geometry)?;

    let offsets = daq.calibrate().context("zeroing channels")?;
    tracing::info!(
        "Zero offsets: force {:.4} V, length {:.4} V",
        offsets.stress_zero,
        offsets.strain_zero
    );

    daq.start()?;
    std::thread::sleep(config.acquisition.poll_period() * DEMO_TICKS);
    daq.pause()?;

    let mut stats = AcquisitionStats::default();
    for event in daq.drain_events() {
        match event {
            AcquisitionEvent::Stats(s) => stats = s,
            AcquisitionEvent::TickFailed { tick, error } => {
                tracing::warn!("Tick {} failed: {}", tick, error)
            }
            _ => {}
        }
    }

    let series = daq.series();
    let system = daq.unit_system();
    tracing::info!(
        "Collected {} points ({} ticks ok, {} failed, {:.1}% success)",
        series.len(),
        stats.successful_ticks,
        stats.failed_ticks,
        stats.success_rate()
    );
    tracing::debug!(
        "Device reads: avg {:.0} us, jitter {} us",
        stats.avg_read_time_us,
        stats.read_jitter_us
    );
    if let Some(last) = series.last() {
        tracing::info!(
            "Last point: strain {:.6}, stress {:.3} {}",
            last.strain,
            last.stress,
            system.stress_unit()
        );
    }

    daq.terminate()?;
    Ok(())
}

/// Install the stderr subscriber and, when configured, a daily log file
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tensile-daq.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}
