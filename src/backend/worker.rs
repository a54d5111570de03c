//! Acquisition worker thread
//!
//! The worker owns the device and its armed task for the lifetime of a
//! configured loop. It runs on its own thread and talks to the
//! [`AcquisitionLoop`](super::AcquisitionLoop) through crossbeam channels.
//!
//! # Responsibilities
//!
//! - **Command processing**: start, pause, end of run, calibration, unit and
//!   geometry changes, series clears, terminate. Every command except `Start`
//!   and `Terminate` answers once it has taken effect.
//! - **Polling**: one batch read per tick at a fixed rate while running
//! - **Conversion**: every sample index goes through the [`SamplePipeline`]
//! - **Publishing**: one atomic append per tick to the [`LiveSeries`]
//! - **Diagnostics**: failed ticks, rejected points, repeated-failure warnings
//!   and periodic stats go out as [`AcquisitionEvent`]s
//! - **Release**: the task handle is released exactly once, on exit or drop
//!
//! # Waiting
//!
//! While armed or paused the worker blocks on its command channel. While
//! running it waits with a deadline at the next tick, so any command
//! (terminate included) is handled without waiting out the period.

use crate::backend::daq_trait::{ChannelLayout, DaqDevice, TaskHandle};
use crate::backend::AcquisitionEvent;
use crate::calibration::compute_offsets;
use crate::config::AcquisitionConfig;
use crate::error::{AcquisitionError, CalibrationError, DomainError};
use crate::series::LiveSeries;
use crate::types::{
    AcquisitionStats, CalibrationOffsets, SeriesPoint, SpecimenGeometry, UnitSystem,
};
use crate::units::{convert_pressure, SamplePipeline};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::ops::ControlFlow;
use std::time::Instant;

/// Commands sent from the loop controller to the worker
#[derive(Debug)]
pub enum WorkerCommand {
    /// Begin or resume sampling
    Start,
    /// Stop sampling at the next tick boundary, then acknowledge
    Pause { ack: Sender<()> },
    /// Finish the run and return to armed, then acknowledge
    EndRun { ack: Sender<()> },
    /// Read one batch and replace the zero offsets
    Calibrate {
        reply: Sender<Result<CalibrationOffsets, CalibrationError>>,
    },
    /// Switch unit system, optionally rescaling the existing series
    SetUnitSystem {
        system: UnitSystem,
        rescale: bool,
        ack: Sender<()>,
    },
    /// Replace the specimen geometry
    SetGeometry {
        geometry: SpecimenGeometry,
        ack: Sender<()>,
    },
    /// Remove every point from the series
    ClearSeries { ack: Sender<()> },
    /// Release the task and exit
    Terminate,
}

/// What the worker does between commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    Armed,
    Running,
    Paused,
}

/// Values that shape conversion for a run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSettings {
    pub offsets: CalibrationOffsets,
    pub unit_system: UnitSystem,
    pub geometry: Option<SpecimenGeometry>,
}

/// Channel ends held by the worker
#[derive(Debug)]
pub struct WorkerChannels {
    pub commands: Receiver<WorkerCommand>,
    pub events: Sender<AcquisitionEvent>,
}

/// Owns the device while the loop is configured
pub struct AcquisitionWorker {
    device: Box<dyn DaqDevice>,
    /// Armed task; `None` once released
    handle: Option<TaskHandle>,
    layout: ChannelLayout,
    config: AcquisitionConfig,
    settings: RunSettings,
    /// Built from `settings`; `None` until geometry is known
    pipeline: Option<SamplePipeline>,
    series: LiveSeries,
    channels: WorkerChannels,
    mode: WorkerMode,
    tick: u64,
    next_tick: Instant,
    last_stats: Instant,
    stats: AcquisitionStats,
}

impl AcquisitionWorker {
    pub fn new(
        device: Box<dyn DaqDevice>,
        handle: TaskHandle,
        layout: ChannelLayout,
        config: AcquisitionConfig,
        settings: RunSettings,
        series: LiveSeries,
        channels: WorkerChannels,
    ) -> Self {
        let now = Instant::now();
        let mut worker = Self {
            device,
            handle: Some(handle),
            layout,
            config,
            settings,
            pipeline: None,
            series,
            channels,
            mode: WorkerMode::Armed,
            tick: 0,
            next_tick: now,
            last_stats: now,
            stats: AcquisitionStats::default(),
        };
        worker.rebuild_pipeline();
        worker
    }

    /// Main worker loop; returns after `Terminate` or when the controller is gone
    pub fn run(mut self) {
        tracing::info!("Acquisition worker started");

        loop {
            let command = match self.mode {
                WorkerMode::Running => match self.channels.commands.recv_deadline(self.next_tick) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                WorkerMode::Armed | WorkerMode::Paused => match self.channels.commands.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_) => break,
                },
            };

            match command {
                Some(cmd) => {
                    if self.handle_command(cmd).is_break() {
                        break;
                    }
                }
                None => {
                    self.tick();
                    self.schedule_next_tick();
                }
            }
        }

        self.release();
        self.send_stats();
        self.try_send_event(AcquisitionEvent::Shutdown);
        tracing::info!("Acquisition worker stopped");
    }

    pub fn mode(&self) -> WorkerMode {
        self.mode
    }

    fn handle_command(&mut self, cmd: WorkerCommand) -> ControlFlow<()> {
        match cmd {
            WorkerCommand::Start => self.start(),
            WorkerCommand::Pause { ack } => {
                if self.mode == WorkerMode::Running {
                    self.mode = WorkerMode::Paused;
                    tracing::debug!("Paused after tick {}", self.tick);
                }
                let _ = ack.send(());
            }
            WorkerCommand::EndRun { ack } => {
                self.mode = WorkerMode::Armed;
                tracing::debug!("Run ended after tick {}", self.tick);
                let _ = ack.send(());
            }
            WorkerCommand::Calibrate { reply } => {
                let result = self.calibrate();
                let _ = reply.send(result);
            }
            WorkerCommand::SetUnitSystem {
                system,
                rescale,
                ack,
            } => {
                self.set_unit_system(system, rescale);
                let _ = ack.send(());
            }
            WorkerCommand::SetGeometry { geometry, ack } => {
                self.settings.geometry = Some(geometry);
                self.rebuild_pipeline();
                let _ = ack.send(());
            }
            WorkerCommand::ClearSeries { ack } => {
                self.series.clear();
                let _ = ack.send(());
            }
            WorkerCommand::Terminate => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn start(&mut self) {
        if self.pipeline.is_none() {
            tracing::warn!("Start ignored: no specimen geometry");
            return;
        }
        if self.mode != WorkerMode::Running {
            self.mode = WorkerMode::Running;
            self.next_tick = Instant::now() + self.config.poll_period();
            tracing::debug!("Sampling every {:?}", self.config.poll_period());
        }
    }

    fn rebuild_pipeline(&mut self) {
        let RunSettings {
            offsets,
            unit_system,
            geometry,
        } = self.settings;
        self.pipeline = geometry.map(|g| SamplePipeline::new(offsets, unit_system, &g));
    }

    fn set_unit_system(&mut self, system: UnitSystem, rescale: bool) {
        let previous = self.settings.unit_system;
        if rescale && previous != system {
            self.series
                .rescale_stress(|stress| convert_pressure(previous, system, stress));
            tracing::info!("Rescaled series stress from {} to {}", previous, system);
        }
        self.settings.unit_system = system;
        self.rebuild_pipeline();
    }

    /// Read one batch through the armed task and average it into offsets
    fn calibrate(&mut self) -> Result<CalibrationOffsets, CalibrationError> {
        let handle = self
            .handle
            .ok_or_else(|| AcquisitionError::Start("no armed task to calibrate with".to_string()))?;
        let batch = self
            .device
            .read_batch(handle, self.config.averaging_factor)?;
        if batch.samples_per_channel() < self.config.averaging_factor {
            tracing::debug!(
                "Short calibration read: {} of {} samples",
                batch.samples_per_channel(),
                self.config.averaging_factor
            );
        }

        let offsets = compute_offsets(
            batch.channel(self.layout.force),
            batch.channel(self.layout.elongation),
        )?;
        self.settings.offsets = offsets;
        self.rebuild_pipeline();

        tracing::info!(
            "Calibrated: stress zero {:.6} V, strain zero {:.6} V",
            offsets.stress_zero,
            offsets.strain_zero
        );
        self.try_send_event(AcquisitionEvent::Calibrated(offsets));
        Ok(offsets)
    }

    /// One polling iteration: read, convert, append
    fn tick(&mut self) {
        let (Some(handle), Some(pipeline)) = (self.handle, self.pipeline) else {
            return;
        };
        self.tick += 1;
        let tick = self.tick;

        match self.device.read_batch(handle, self.config.averaging_factor) {
            Ok(batch) => {
                self.stats.successful_ticks += 1;
                self.stats.consecutive_failures = 0;

                let (points, rejected) = convert_batch(
                    &pipeline,
                    batch.channel(self.layout.force),
                    batch.channel(self.layout.elongation),
                );
                self.series.append_tick(&points);
                self.stats.points_appended += points.len() as u64;

                if let Some((count, error)) = rejected {
                    self.stats.points_rejected += count as u64;
                    tracing::warn!("Tick {}: dropped {} points: {}", tick, count, error);
                    self.try_send_event(AcquisitionEvent::PointsRejected {
                        tick,
                        count,
                        error,
                    });
                }
                tracing::debug!("Tick {}: appended {} points", tick, points.len());
            }
            Err(error) => {
                self.stats.failed_ticks += 1;
                self.stats.consecutive_failures += 1;
                tracing::warn!("Tick {} skipped: {}", tick, error);
                self.try_send_event(AcquisitionEvent::TickFailed { tick, error });

                let threshold = self.config.failure_report_threshold;
                let consecutive = self.stats.consecutive_failures;
                if threshold > 0 && consecutive % threshold == 0 {
                    tracing::warn!("{} consecutive failed reads", consecutive);
                    self.try_send_event(AcquisitionEvent::RepeatedFailures { consecutive });
                }
            }
        }

        if self.last_stats.elapsed() >= self.config.stats_interval() {
            self.send_stats();
        }
    }

    /// Advance the deadline by one period, skipping missed ticks
    fn schedule_next_tick(&mut self) {
        let period = self.config.poll_period();
        self.next_tick += period;
        let now = Instant::now();
        if self.next_tick < now {
            self.next_tick = now + period;
        }
    }

    fn send_stats(&mut self) {
        let device = self.device.stats();
        self.stats.avg_read_time_us = device.avg_read_time_us();
        self.stats.last_read_time_us = device.last_read_time_us;
        self.stats.read_jitter_us = device.jitter_us();
        self.last_stats = Instant::now();
        let stats = self.stats.clone();
        self.try_send_event(AcquisitionEvent::Stats(stats));
    }

    /// Send an event without blocking; a full queue drops it and counts the drop
    fn try_send_event(&mut self, event: AcquisitionEvent) {
        if self.channels.events.try_send(event).is_err() {
            self.stats.dropped_events += 1;
        }
    }

    /// Stop and release the armed task if still held
    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            match self.device.stop_and_release(handle) {
                Ok(()) => tracing::info!("Released task {}", handle),
                Err(e) => {
                    tracing::error!("Failed to release task {}: {}", handle, e);
                    self.try_send_event(AcquisitionEvent::ReleaseFailed(e));
                }
            }
        }
    }
}

impl Drop for AcquisitionWorker {
    fn drop(&mut self) {
        self.release();
    }
}

/// Convert paired readings, keeping the good points in order
///
/// Returns the points and, if any were dropped, the drop count with the first
/// error seen.
fn convert_batch(
    pipeline: &SamplePipeline,
    force: &[f64],
    length: &[f64],
) -> (Vec<SeriesPoint>, Option<(usize, DomainError)>) {
    let mut points = Vec::with_capacity(force.len().min(length.len()));
    let mut rejected: Option<(usize, DomainError)> = None;

    for (&f, &l) in force.iter().zip(length) {
        match pipeline.convert(f, l) {
            Ok(point) => points.push(point),
            Err(e) => match rejected.as_mut() {
                Some((count, _)) => *count += 1,
                None => rejected = Some((1, e)),
            },
        }
    }
    (points, rejected)
}
