//! DaqDevice trait: the hardware sampling interface
//!
//! The acquisition loop talks to hardware only through [`DaqDevice`]. Vendor
//! driver bindings implement it for real devices; [`SimulatedDaq`] implements
//! it for tests and demos.
//!
//! [`SimulatedDaq`]: super::simulated_daq::SimulatedDaq

use crate::error::{AcquisitionError, ConfigurationError};
use crate::types::{ChannelRole, ChannelSpec, SampleBatch, WiringMode};
use std::collections::{HashSet, VecDeque};

/// Size of the rolling window for recent read times
const RECENT_WINDOW_SIZE: usize = 100;

/// Opaque handle to an armed device task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Analog input capacity of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLimits {
    /// Differential pairs; pair `n` uses `ai{n}` and `ai{n + differential}`
    pub differential: u32,
    /// Single-ended inputs
    pub single_ended: u32,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            differential: 4,
            single_ended: 8,
        }
    }
}

/// Position of each role's channel within a [`SampleBatch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    pub force: usize,
    pub elongation: usize,
}

impl ChannelLayout {
    /// Validate a channel list against a device's inputs
    ///
    /// Rejects an empty list, repeated or overlapping terminals (a
    /// differential channel also claims its negative terminal), wiring modes
    /// the input cannot take, physical channel strings that name a different
    /// input, and role sets other than exactly one force and one elongation
    /// channel.
    pub fn from_specs(
        channels: &[ChannelSpec],
        limits: ChannelLimits,
    ) -> Result<Self, ConfigurationError> {
        if channels.is_empty() {
            return Err(ConfigurationError::NoChannels);
        }

        let mut occupied = HashSet::new();
        let mut force = None;
        let mut elongation = None;

        for (position, spec) in channels.iter().enumerate() {
            if spec.physical_index() != Some(spec.index) {
                return Err(ConfigurationError::InvalidPhysicalChannel {
                    index: spec.index,
                    physical: spec.physical_channel.clone(),
                });
            }

            let terminals = match spec.wiring {
                WiringMode::Differential if spec.index < limits.differential => {
                    vec![spec.index, spec.index + limits.differential]
                }
                WiringMode::ReferencedSingleEnded if spec.index < limits.single_ended => {
                    vec![spec.index]
                }
                mode => {
                    return Err(ConfigurationError::InvalidWiring {
                        index: spec.index,
                        mode: mode.to_string(),
                    })
                }
            };
            for terminal in terminals {
                if !occupied.insert(terminal) {
                    return Err(ConfigurationError::ChannelInUse { index: spec.index });
                }
            }

            let slot = match spec.role {
                ChannelRole::Force => &mut force,
                ChannelRole::Elongation => &mut elongation,
            };
            if slot.replace(position).is_some() {
                return Err(ConfigurationError::DuplicateRole(spec.role.to_string()));
            }
        }

        Ok(Self {
            force: force
                .ok_or_else(|| ConfigurationError::MissingRole(ChannelRole::Force.to_string()))?,
            elongation: elongation.ok_or_else(|| {
                ConfigurationError::MissingRole(ChannelRole::Elongation.to_string())
            })?,
        })
    }
}

/// Statistics for device reads
///
/// Tracks success rates and read latency.
#[derive(Debug, Clone)]
pub struct SamplerStats {
    /// Total number of successful reads
    pub successful_reads: u64,
    /// Total number of failed reads
    pub failed_reads: u64,
    /// Total samples returned across all channels
    pub total_samples: u64,
    /// Total read time in microseconds
    pub total_read_time_us: u64,
    /// Last read time in microseconds
    pub last_read_time_us: u64,
    /// Rolling window of recent read times
    pub recent_read_times: VecDeque<u64>,
}

impl Default for SamplerStats {
    fn default() -> Self {
        Self {
            successful_reads: 0,
            failed_reads: 0,
            total_samples: 0,
            total_read_time_us: 0,
            last_read_time_us: 0,
            recent_read_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl SamplerStats {
    /// Calculate average read time in microseconds
    pub fn avg_read_time_us(&self) -> f64 {
        if self.successful_reads == 0 {
            0.0
        } else {
            self.total_read_time_us as f64 / self.successful_reads as f64
        }
    }

    /// Record a successful read
    pub fn record_success(&mut self, time_us: u64, samples: u64) {
        self.successful_reads += 1;
        self.total_samples += samples;
        self.total_read_time_us += time_us;
        self.last_read_time_us = time_us;

        self.recent_read_times.push_back(time_us);
        if self.recent_read_times.len() > RECENT_WINDOW_SIZE {
            self.recent_read_times.pop_front();
        }
    }

    /// Record a failed read
    pub fn record_failure(&mut self) {
        self.failed_reads += 1;
    }

    /// Calculate jitter (max - min) over recent window in microseconds
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_read_times.iter().min().copied().unwrap_or(0);
        let max = self.recent_read_times.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Unified interface for analog acquisition devices
///
/// Implementations must be `Send`: the device is moved onto the acquisition
/// worker thread once the loop is armed.
///
/// # Contract
///
/// - `configure_channel` is called once per channel, in order, before
///   `arm_and_start`. A configuration that fails part way is undone with
///   `clear_channels`.
/// - `read_batch` returns one vector per configured channel, in configuration
///   order. A vector may be shorter than `samples` (short read).
/// - Every handle returned by `arm_and_start` is passed to
///   `stop_and_release` exactly once.
#[cfg_attr(test, mockall::automock)]
pub trait DaqDevice: Send {
    /// Input capacity used to validate channel lists
    fn channel_limits(&self) -> ChannelLimits;

    /// Register a channel on the device task
    fn configure_channel(&mut self, spec: &ChannelSpec) -> Result<(), ConfigurationError>;

    /// Forget every registered channel; only called while no task is armed
    fn clear_channels(&mut self);

    /// Arm the task and start the sample clock
    fn arm_and_start(&mut self) -> Result<TaskHandle, AcquisitionError>;

    /// Read up to `samples` readings from every configured channel
    fn read_batch(
        &mut self,
        handle: TaskHandle,
        samples: usize,
    ) -> Result<SampleBatch, AcquisitionError>;

    /// Stop the task and release the handle
    fn stop_and_release(&mut self, handle: TaskHandle) -> Result<(), AcquisitionError>;

    /// Read statistics
    fn stats(&self) -> &SamplerStats;
}
