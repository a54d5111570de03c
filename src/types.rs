//! Core data types for tensile-daq
//!
//! This module contains the data structures shared between the acquisition
//! worker, the conversion pipeline and the consumer side.
//!
//! # Main Types
//!
//! - [`ChannelSpec`] - One analog input channel (index, wiring, role)
//! - [`SampleBatch`] - Raw voltages for every configured channel from one read
//! - [`CalibrationOffsets`] - Zero-offset volts for the force and length channels
//! - [`UnitSystem`] - English (kip, in, ksi) or Metric (N, mm, MPa)
//! - [`SpecimenGeometry`] - Cross-sectional area and gauge length
//! - [`SeriesPoint`] - One (strain, stress) point of the live curve
//! - [`LoopState`] - Lifecycle state of the acquisition loop
//! - [`AcquisitionStats`] - Counters reported by the worker

use crate::error::ValidationError;
use crate::units;
use serde::{Deserialize, Serialize};

/// Analog input wiring configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WiringMode {
    /// Differential input; occupies `aiN` and its negative terminal `aiN+pairs`
    Differential,
    /// Referenced single-ended input against AI GND
    ReferencedSingleEnded,
}

impl std::fmt::Display for WiringMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WiringMode::Differential => write!(f, "differential"),
            WiringMode::ReferencedSingleEnded => write!(f, "RSE"),
        }
    }
}

/// Which physical quantity a channel measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelRole {
    /// Load cell output
    Force,
    /// Extensometer output
    Elongation,
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRole::Force => write!(f, "force"),
            ChannelRole::Elongation => write!(f, "elongation"),
        }
    }
}

/// One analog input channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Analog input index (the `N` in `aiN`)
    pub index: u32,
    /// Wiring mode
    pub wiring: WiringMode,
    /// Physical channel string, e.g. `Dev1/ai3`
    pub physical_channel: String,
    /// Quantity measured on this channel
    pub role: ChannelRole,
}

impl ChannelSpec {
    /// Build a spec whose physical channel is `{device}/ai{index}`
    pub fn new(device: &str, index: u32, wiring: WiringMode, role: ChannelRole) -> Self {
        Self {
            index,
            wiring,
            physical_channel: format!("{}/ai{}", device, index),
            role,
        }
    }

    /// Index parsed back out of the physical channel string
    pub fn physical_index(&self) -> Option<u32> {
        let (_, tail) = self.physical_channel.rsplit_once("/ai")?;
        tail.parse().ok()
    }
}

/// Raw voltages from one read, one vector per configured channel
///
/// Channel order matches the order the channels were configured in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBatch {
    channels: Vec<Vec<f64>>,
}

impl SampleBatch {
    /// Create a batch from per-channel readings
    pub fn new(channels: Vec<Vec<f64>>) -> Self {
        Self { channels }
    }

    /// Readings for the channel at `position` in configuration order
    pub fn channel(&self, position: usize) -> &[f64] {
        self.channels.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of channels in the batch
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Shortest per-channel length
    pub fn samples_per_channel(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// True when no channel holds a reading
    pub fn is_empty(&self) -> bool {
        self.samples_per_channel() == 0
    }
}

/// Zero offsets in volts, subtracted from every raw reading of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOffsets {
    /// Force channel zero
    pub stress_zero: f64,
    /// Length channel zero
    pub strain_zero: f64,
}

/// Unit system used for displayed quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UnitSystem {
    /// kip, inch, ksi
    #[default]
    English,
    /// newton, millimetre, MPa
    Metric,
}

impl UnitSystem {
    pub fn force_unit(&self) -> &'static str {
        match self {
            UnitSystem::English => "kip",
            UnitSystem::Metric => "N",
        }
    }

    pub fn length_unit(&self) -> &'static str {
        match self {
            UnitSystem::English => "in",
            UnitSystem::Metric => "mm",
        }
    }

    pub fn area_unit(&self) -> &'static str {
        match self {
            UnitSystem::English => "in²",
            UnitSystem::Metric => "mm²",
        }
    }

    pub fn stress_unit(&self) -> &'static str {
        match self {
            UnitSystem::English => "ksi",
            UnitSystem::Metric => "MPa",
        }
    }
}

impl std::fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitSystem::English => write!(f, "English"),
            UnitSystem::Metric => write!(f, "Metric"),
        }
    }
}

/// Specimen cross-section as entered by the operator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum CrossSection {
    Rectangular { width: f64, depth: f64 },
    Circular { diameter: f64 },
}

impl CrossSection {
    pub fn area(&self) -> f64 {
        match *self {
            CrossSection::Rectangular { width, depth } => width * depth,
            CrossSection::Circular { diameter } => std::f64::consts::PI * diameter * diameter / 4.0,
        }
    }
}

/// Cross-sectional area and gauge length, both strictly positive
///
/// The values are tagged with the unit system they were entered in; the
/// conversion pipeline re-expresses them in whatever system is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecimenGeometry {
    area: f64,
    gauge_length: f64,
    units: UnitSystem,
}

impl SpecimenGeometry {
    pub fn new(area: f64, gauge_length: f64, units: UnitSystem) -> Result<Self, ValidationError> {
        check_positive("area", area)?;
        check_positive("gauge length", gauge_length)?;
        Ok(Self {
            area,
            gauge_length,
            units,
        })
    }

    /// Geometry from a cross-section and gauge length
    pub fn from_section(
        section: CrossSection,
        gauge_length: f64,
        units: UnitSystem,
    ) -> Result<Self, ValidationError> {
        match section {
            CrossSection::Rectangular { width, depth } => {
                check_positive("width", width)?;
                check_positive("depth", depth)?;
            }
            CrossSection::Circular { diameter } => check_positive("diameter", diameter)?,
        }
        Self::new(section.area(), gauge_length, units)
    }

    /// Area in the system it was entered in
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Gauge length in the system it was entered in
    pub fn gauge_length(&self) -> f64 {
        self.gauge_length
    }

    pub fn units(&self) -> UnitSystem {
        self.units
    }

    /// Area expressed in `system`
    pub fn area_in(&self, system: UnitSystem) -> f64 {
        units::convert_area(self.units, system, self.area)
    }

    /// Gauge length expressed in `system`
    pub fn gauge_length_in(&self, system: UnitSystem) -> f64 {
        units::convert_length(self.units, system, self.gauge_length)
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::NonPositive { field, value })
    }
}

/// One point of the stress-strain curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub strain: f64,
    pub stress: f64,
}

impl SeriesPoint {
    pub fn new(strain: f64, stress: f64) -> Self {
        Self { strain, stress }
    }

    /// As an `[x, y]` pair for plotting
    pub fn as_xy(&self) -> [f64; 2] {
        [self.strain, self.stress]
    }
}

/// Lifecycle state of the acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Not yet configured
    Idle,
    /// Channels configured and task armed, not sampling
    Armed,
    /// Sampling and publishing
    Running,
    /// Alive, not sampling
    Paused,
    /// Final
    Terminated,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Terminated)
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Idle => write!(f, "idle"),
            LoopState::Armed => write!(f, "armed"),
            LoopState::Running => write!(f, "running"),
            LoopState::Paused => write!(f, "paused"),
            LoopState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Counters reported by the acquisition worker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionStats {
    /// Ticks whose read succeeded
    pub successful_ticks: u64,
    /// Ticks skipped because the read failed
    pub failed_ticks: u64,
    /// Failed ticks since the last successful one
    pub consecutive_failures: u64,
    /// Points appended to the live series
    pub points_appended: u64,
    /// Points dropped because stress/strain could not be computed
    pub points_rejected: u64,
    /// Events dropped because the consumer queue was full
    pub dropped_events: u64,
    /// Average device read time in microseconds
    pub avg_read_time_us: f64,
    /// Last device read time in microseconds
    pub last_read_time_us: u64,
    /// Spread of recent device read times in microseconds
    pub read_jitter_us: u64,
}

impl AcquisitionStats {
    /// Calculate the tick success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_ticks + self.failed_ticks;
        if total == 0 {
            100.0
        } else {
            (self.successful_ticks as f64 / total as f64) * 100.0
        }
    }
}
