//! Acquisition backend
//!
//! This module runs the sampling loop on a dedicated thread so the consumer
//! (a plot, a logger, a test) never waits on hardware. Control flows to the
//! worker over crossbeam channels; points flow back through the shared
//! [`LiveSeries`] and diagnostics through [`AcquisitionEvent`]s.
//!
//! # Architecture
//!
//! - [`AcquisitionLoop`] - Caller-side controller and lifecycle state machine
//! - [`AcquisitionWorker`] - Worker thread that owns the device while armed
//! - [`WorkerCommand`] - Messages from the controller to the worker
//! - [`AcquisitionEvent`] - Diagnostics from the loop to the consumer
//!
//! # Components
//!
//! - [`DaqDevice`] - Hardware sampling interface
//! - [`SimulatedDaq`] - Pattern-driven device for tests and demos
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──configure──▶ Armed ──start──▶ Running ◀──start/pause──▶ Paused
//!                       ▲                 │                        │
//!                       └────end_run──────┴────────────────────────┘
//! any non-terminal ──terminate──▶ Terminated
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tensile_daq::backend::{AcquisitionLoop, SimulatedDaq};
//! use tensile_daq::config::AppConfig;
//!
//! let config = AppConfig::default();
//! let mut daq = AcquisitionLoop::new(
//!     Box::new(SimulatedDaq::from_hardware_config(&config.hardware)),
//!     config.acquisition.clone(),
//! );
//! daq.configure(config.channels.clone())?;
//! daq.set_geometry(SpecimenGeometry::new(0.05, 2.0, UnitSystem::English)?)?;
//! daq.calibrate()?;
//! daq.start()?;
//!
//! let series = daq.series();
//! for event in daq.drain_events() {
//!     tracing::debug!("{:?}", event);
//! }
//! daq.terminate()?;
//! ```

pub mod daq_trait;
pub mod simulated_daq;
pub mod worker;

pub use daq_trait::{ChannelLayout, ChannelLimits, DaqDevice, SamplerStats, TaskHandle};
pub use simulated_daq::{SignalPattern, SimulatedDaq, SimulatedDaqMonitor};
pub use worker::{AcquisitionWorker, RunSettings, WorkerChannels, WorkerCommand, WorkerMode};

use crate::config::AcquisitionConfig;
use crate::error::{
    AcquisitionError, DaqError, DomainError, Result, StateError, ValidationError,
};
use crate::series::LiveSeries;
use crate::types::{
    AcquisitionStats, CalibrationOffsets, ChannelSpec, LoopState, SpecimenGeometry, UnitSystem,
};
use crate::units::convert_pressure;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::JoinHandle;

/// Command queue depth towards the worker
const COMMAND_QUEUE_SIZE: usize = 64;

/// Diagnostics sent from the loop to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    /// The loop entered a new state
    StateChanged(LoopState),
    /// New zero offsets are in effect
    Calibrated(CalibrationOffsets),
    /// A tick's read failed; nothing was appended
    TickFailed { tick: u64, error: AcquisitionError },
    /// Some of a tick's points could not be converted and were dropped
    PointsRejected {
        tick: u64,
        count: usize,
        error: DomainError,
    },
    /// `consecutive` reads in a row have failed
    RepeatedFailures { consecutive: u64 },
    /// Stopping the task failed; the handle is considered released
    ReleaseFailed(AcquisitionError),
    /// Periodic counters
    Stats(AcquisitionStats),
    /// The worker has released the device and exited
    Shutdown,
}

/// Controller-side handle to a running worker
struct WorkerLink {
    commands: Sender<WorkerCommand>,
    thread: JoinHandle<()>,
}

/// Acquisition-and-conversion control loop
///
/// All operations run on the caller's thread and return once the worker has
/// applied them. The [`LiveSeries`] from [`series`](Self::series) can be read
/// from any thread.
pub struct AcquisitionLoop {
    config: AcquisitionConfig,
    state: LoopState,
    /// Held while idle; moved to the worker on configure
    device: Option<Box<dyn DaqDevice>>,
    worker: Option<WorkerLink>,
    /// Mirror of what the worker converts with
    settings: RunSettings,
    series: LiveSeries,
    event_tx: Sender<AcquisitionEvent>,
    event_rx: Receiver<AcquisitionEvent>,
    /// State changes lost to a full event buffer
    dropped_events: u64,
}

impl AcquisitionLoop {
    /// Create an idle loop around a device
    pub fn new(device: Box<dyn DaqDevice>, config: AcquisitionConfig) -> Self {
        let (event_tx, event_rx) = bounded(config.event_buffer_size.max(1));
        Self {
            config,
            state: LoopState::Idle,
            device: Some(device),
            worker: None,
            settings: RunSettings::default(),
            series: LiveSeries::new(),
            event_tx,
            event_rx,
            dropped_events: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Zero offsets of the current run (zero until calibrated)
    pub fn offsets(&self) -> CalibrationOffsets {
        self.settings.offsets
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.settings.unit_system
    }

    pub fn geometry(&self) -> Option<SpecimenGeometry> {
        self.settings.geometry
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Shared handle to the live series
    pub fn series(&self) -> LiveSeries {
        self.series.clone()
    }

    /// Next pending event, if any
    pub fn try_recv_event(&self) -> Option<AcquisitionEvent> {
        self.event_rx.try_recv().ok()
    }

    /// State-change events dropped because the event buffer was full
    ///
    /// Drops on the worker side are reported in
    /// [`AcquisitionStats::dropped_events`](crate::types::AcquisitionStats).
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// All pending events
    pub fn drain_events(&self) -> Vec<AcquisitionEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Register and arm `channels`, then start the worker in `Armed`
    ///
    /// On failure the loop stays `Idle`, channel registrations are undone and
    /// a handle obtained from the device has been released.
    pub fn configure(&mut self, channels: Vec<ChannelSpec>) -> Result<()> {
        self.require("configure", &[LoopState::Idle])?;
        let mut device = self
            .device
            .take()
            .ok_or_else(|| DaqError::Worker("device is no longer available".to_string()))?;

        let layout = match ChannelLayout::from_specs(&channels, device.channel_limits()) {
            Ok(layout) => layout,
            Err(e) => {
                self.device = Some(device);
                return Err(e.into());
            }
        };

        for spec in &channels {
            if let Err(e) = device.configure_channel(spec) {
                tracing::warn!("Device rejected {}: {}", spec.physical_channel, e);
                device.clear_channels();
                self.device = Some(device);
                return Err(e.into());
            }
        }

        let handle = match device.arm_and_start() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Failed to arm task: {}", e);
                device.clear_channels();
                self.device = Some(device);
                return Err(e.into());
            }
        };

        let (cmd_tx, cmd_rx) = bounded(COMMAND_QUEUE_SIZE);
        let worker = AcquisitionWorker::new(
            device,
            handle,
            layout,
            self.config.clone(),
            self.settings,
            self.series.clone(),
            WorkerChannels {
                commands: cmd_rx,
                events: self.event_tx.clone(),
            },
        );
        // A failed spawn drops the worker, which releases the handle.
        let thread = std::thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || worker.run())?;

        tracing::info!(
            "Configured {} channels, task {} armed",
            channels.len(),
            handle
        );
        self.worker = Some(WorkerLink {
            commands: cmd_tx,
            thread,
        });
        self.set_state(LoopState::Armed);
        Ok(())
    }

    /// Replace the zero offsets with the mean of one batch read now
    ///
    /// Only valid while `Armed`. On failure the previous offsets stay.
    pub fn calibrate(&mut self) -> Result<CalibrationOffsets> {
        self.require("calibrate", &[LoopState::Armed])?;
        let (reply_tx, reply_rx) = bounded(1);
        self.send(WorkerCommand::Calibrate { reply: reply_tx })?;
        let offsets = reply_rx.recv().map_err(|_| worker_gone())??;
        self.settings.offsets = offsets;
        Ok(offsets)
    }

    /// Begin sampling from `Armed`, or resume from `Paused`
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            LoopState::Running => Ok(()),
            LoopState::Armed | LoopState::Paused => {
                if self.settings.geometry.is_none() {
                    return Err(ValidationError::GeometryNotSet.into());
                }
                self.send(WorkerCommand::Start)?;
                self.set_state(LoopState::Running);
                Ok(())
            }
            state => Err(StateError::new("start", state).into()),
        }
    }

    /// Alias of [`start`](Self::start)
    pub fn collect(&mut self) -> Result<()> {
        self.start()
    }

    /// Stop sampling at the next tick boundary
    ///
    /// Returns after the in-flight tick, if any, has been appended. A no-op
    /// while already `Paused`.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            LoopState::Paused => Ok(()),
            LoopState::Running => {
                self.request(|ack| WorkerCommand::Pause { ack })?;
                self.set_state(LoopState::Paused);
                Ok(())
            }
            state => Err(StateError::new("pause", state).into()),
        }
    }

    /// Finish the current run and return to `Armed`
    ///
    /// The device stays armed with its offsets; recalibration, geometry
    /// changes and series clears are allowed again.
    pub fn end_run(&mut self) -> Result<()> {
        self.require("end run", &[LoopState::Running, LoopState::Paused])?;
        self.request(|ack| WorkerCommand::EndRun { ack })?;
        self.set_state(LoopState::Armed);
        Ok(())
    }

    /// Stop the worker, release the device task and enter `Terminated`
    ///
    /// Idempotent. Completes even if the worker has already exited.
    pub fn terminate(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }

        if let Some(link) = self.worker.take() {
            let _ = link.commands.send(WorkerCommand::Terminate);
            if link.thread.join().is_err() {
                tracing::error!("Acquisition worker panicked");
            }
        }
        self.device = None;
        self.set_state(LoopState::Terminated);
        Ok(())
    }

    /// Change the unit system applied to new samples
    ///
    /// With `rescale_existing`, every point already in the series has its
    /// stress converted to the new system; strain is untouched.
    pub fn set_unit_system(&mut self, system: UnitSystem, rescale_existing: bool) -> Result<()> {
        if self.state.is_terminal() {
            return Err(StateError::new("change units", self.state).into());
        }

        if self.worker.is_some() {
            self.request(|ack| WorkerCommand::SetUnitSystem {
                system,
                rescale: rescale_existing,
                ack,
            })?;
        } else if rescale_existing && self.settings.unit_system != system {
            let previous = self.settings.unit_system;
            self.series
                .rescale_stress(|stress| convert_pressure(previous, system, stress));
        }

        tracing::info!("Unit system set to {}", system);
        self.settings.unit_system = system;
        Ok(())
    }

    /// Set the specimen geometry used for stress and strain
    ///
    /// Only between runs (`Idle` or `Armed`); a paused run keeps its geometry.
    pub fn set_geometry(&mut self, geometry: SpecimenGeometry) -> Result<()> {
        self.require("set geometry", &[LoopState::Idle, LoopState::Armed])?;

        if self.worker.is_some() {
            self.request(|ack| WorkerCommand::SetGeometry { geometry, ack })?;
        }
        tracing::debug!(
            "Specimen geometry: area {} {}, gauge length {} {}",
            geometry.area(),
            geometry.units().area_unit(),
            geometry.gauge_length(),
            geometry.units().length_unit()
        );
        self.settings.geometry = Some(geometry);
        Ok(())
    }

    /// Remove every point from the live series
    pub fn clear_series(&mut self) -> Result<()> {
        if self.state == LoopState::Running {
            return Err(StateError::new("clear series", self.state).into());
        }

        if self.worker.is_some() {
            self.request(|ack| WorkerCommand::ClearSeries { ack })?;
        } else {
            self.series.clear();
        }
        Ok(())
    }

    fn require(&self, operation: &'static str, allowed: &[LoopState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(StateError::new(operation, self.state).into())
        }
    }

    fn set_state(&mut self, state: LoopState) {
        tracing::info!("Acquisition {} -> {}", self.state, state);
        self.state = state;
        if self.event_tx.try_send(AcquisitionEvent::StateChanged(state)).is_err() {
            self.dropped_events += 1;
            tracing::debug!("Event buffer full, dropped state change to {}", state);
        }
    }

    fn send(&self, cmd: WorkerCommand) -> Result<()> {
        let link = self.worker.as_ref().ok_or_else(worker_gone)?;
        link.commands.send(cmd).map_err(|_| worker_gone())
    }

    /// Send a command carrying an acknowledgement channel and wait for it
    fn request(&self, make: impl FnOnce(Sender<()>) -> WorkerCommand) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.send(make(ack_tx))?;
        ack_rx.recv().map_err(|_| worker_gone())
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}

fn worker_gone() -> DaqError {
    DaqError::Worker("acquisition worker has exited".to_string())
}
