//! Simulated DAQ device for testing and demos
//!
//! This module provides a [`DaqDevice`] that generates voltages from
//! configurable patterns instead of talking to hardware. It is used by the
//! test suite and by the headless binary.
//!
//! # Features
//!
//! - **Pattern-based data generation**: one [`SignalPattern`] per channel role
//! - **Deterministic timing**: patterns are evaluated on the sample clock, not
//!   wall time, so the same reads always produce the same voltages
//! - **Fault injection**: failed arms, failed reads (by read number or
//!   periodically), short reads, failed releases, rejected channels
//! - **Observation**: a cloneable [`SimulatedDaqMonitor`] counts arms, reads
//!   and releases from outside the worker thread
//!
//! # Example
//!
//! ```ignore
//! use tensile_daq::backend::{SignalPattern, SimulatedDaq};
//! use tensile_daq::types::ChannelRole;
//!
//! let device = SimulatedDaq::new()
//!     .with_pattern(ChannelRole::Force, SignalPattern::Ramp { start: 0.0, slope: 0.5 })
//!     .with_pattern(ChannelRole::Elongation, SignalPattern::Constant(0.25))
//!     .with_failing_reads([3, 7]);
//! let monitor = device.monitor();
//! ```

use crate::config::HardwareConfig;
use crate::error::{AcquisitionError, ConfigurationError};
use crate::types::{ChannelRole, ChannelSpec, SampleBatch};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::daq_trait::{ChannelLimits, DaqDevice, SamplerStats, TaskHandle};

/// Pattern for generating simulated voltages
#[derive(Debug, Clone, PartialEq)]
pub enum SignalPattern {
    /// Constant voltage
    Constant(f64),
    /// Linear ramp: `start + slope * t` (volts, volts per second)
    Ramp { start: f64, slope: f64 },
    /// Sine wave
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Explicit readings, one per sample, holding the last value once exhausted
    Sequence(Vec<f64>),
    /// Uniform random values within range
    Random { min: f64, max: f64 },
}

impl Default for SignalPattern {
    fn default() -> Self {
        SignalPattern::Constant(0.0)
    }
}

#[derive(Debug, Clone)]
struct ChannelSignal {
    pattern: SignalPattern,
    noise_amplitude: f64,
}

impl ChannelSignal {
    fn generate(&self, sample_index: u64, t: f64, rng: &mut XorShift) -> f64 {
        let base = match &self.pattern {
            SignalPattern::Constant(v) => *v,
            SignalPattern::Ramp { start, slope } => start + slope * t,
            SignalPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin(),
            SignalPattern::Sequence(values) => {
                let i = (sample_index as usize).min(values.len().saturating_sub(1));
                values.get(i).copied().unwrap_or(0.0)
            }
            SignalPattern::Random { min, max } => min + rng.next_f64() * (max - min),
        };

        if self.noise_amplitude > 0.0 {
            base + (rng.next_f64() - 0.5) * 2.0 * self.noise_amplitude
        } else {
            base
        }
    }
}

/// Small deterministic PRNG for noise and random patterns
#[derive(Debug, Clone)]
struct XorShift(u64);

impl XorShift {
    fn next_f64(&mut self) -> f64 {
        let mut s = self.0;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.0 = s;
        (s as f64) / (u64::MAX as f64)
    }
}

#[derive(Debug, Default)]
struct MonitorInner {
    arms: AtomicU64,
    reads: AtomicU64,
    failed_reads: AtomicU64,
    releases: AtomicU64,
    released: Mutex<Vec<TaskHandle>>,
}

/// Cloneable view of a [`SimulatedDaq`]'s activity
#[derive(Debug, Clone, Default)]
pub struct SimulatedDaqMonitor {
    inner: Arc<MonitorInner>,
}

impl SimulatedDaqMonitor {
    /// Successful `arm_and_start` calls
    pub fn arm_count(&self) -> u64 {
        self.inner.arms.load(Ordering::SeqCst)
    }

    /// `read_batch` calls, failed ones included
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// `read_batch` calls that returned an error
    pub fn failed_read_count(&self) -> u64 {
        self.inner.failed_reads.load(Ordering::SeqCst)
    }

    /// `stop_and_release` calls, failed ones included
    pub fn release_count(&self) -> u64 {
        self.inner.releases.load(Ordering::SeqCst)
    }

    /// Handles passed to `stop_and_release`, in call order
    pub fn released_handles(&self) -> Vec<TaskHandle> {
        self.inner
            .released
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

/// Simulated analog input device
pub struct SimulatedDaq {
    /// Device name expected in physical channel strings
    device: String,
    /// Sample clock
    sample_rate_hz: f64,
    /// Input capacity
    limits: ChannelLimits,
    /// Input range; generated values are clamped to it
    voltage_range: (f64, f64),
    /// Configured channels in order
    channels: Vec<ChannelSpec>,
    /// Signal per role
    signals: HashMap<ChannelRole, ChannelSignal>,
    /// Handle of the armed task
    active: Option<TaskHandle>,
    next_handle: u64,
    /// Samples produced per channel since arming
    sample_cursor: u64,
    rng: XorShift,
    /// Simulated read latency
    read_delay: Duration,
    /// Read numbers (0-based) that fail
    failing_reads: HashSet<u64>,
    /// Every n-th read fails (1-based)
    fail_every: Option<u64>,
    /// Maximum readings returned per channel
    short_read: Option<usize>,
    fail_arm: bool,
    fail_release: bool,
    /// Channel index the device refuses
    rejected_channel: Option<u32>,
    stats: SamplerStats,
    monitor: SimulatedDaqMonitor,
}

impl Default for SimulatedDaq {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDaq {
    /// Create a simulated `Dev1` with zero-volt inputs
    pub fn new() -> Self {
        Self {
            device: "Dev1".to_string(),
            sample_rate_hz: 100.0,
            limits: ChannelLimits::default(),
            voltage_range: (-10.0, 10.0),
            channels: Vec::new(),
            signals: HashMap::new(),
            active: None,
            next_handle: 1,
            sample_cursor: 0,
            rng: XorShift(0x2545_F491_4F6C_DD1D),
            read_delay: Duration::ZERO,
            failing_reads: HashSet::new(),
            fail_every: None,
            short_read: None,
            fail_arm: false,
            fail_release: false,
            rejected_channel: None,
            stats: SamplerStats::default(),
            monitor: SimulatedDaqMonitor::default(),
        }
    }

    /// Create a simulated device matching a hardware description
    pub fn from_hardware_config(config: &HardwareConfig) -> Self {
        Self {
            device: config.device.clone(),
            sample_rate_hz: config.sample_rate_hz,
            limits: ChannelLimits {
                differential: config.differential_channels,
                single_ended: config.single_ended_channels,
            },
            voltage_range: (config.min_voltage, config.max_voltage),
            ..Self::new()
        }
    }

    /// Set the signal for a channel role
    pub fn with_pattern(mut self, role: ChannelRole, pattern: SignalPattern) -> Self {
        let noise_amplitude = self.signals.get(&role).map(|s| s.noise_amplitude).unwrap_or(0.0);
        self.signals.insert(
            role,
            ChannelSignal {
                pattern,
                noise_amplitude,
            },
        );
        self
    }

    /// Add uniform noise of `amplitude` volts to a role's signal
    pub fn with_noise(mut self, role: ChannelRole, amplitude: f64) -> Self {
        self.signals
            .entry(role)
            .or_insert_with(|| ChannelSignal {
                pattern: SignalPattern::default(),
                noise_amplitude: 0.0,
            })
            .noise_amplitude = amplitude;
        self
    }

    /// Fail the given reads (0-based read numbers)
    pub fn with_failing_reads(mut self, reads: impl IntoIterator<Item = u64>) -> Self {
        self.failing_reads.extend(reads);
        self
    }

    /// Fail every `n`-th read
    pub fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Return at most `samples` readings per channel
    pub fn with_short_reads(mut self, samples: usize) -> Self {
        self.short_read = Some(samples);
        self
    }

    /// Sleep this long inside every read
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Make `arm_and_start` fail
    pub fn with_failing_arm(mut self) -> Self {
        self.fail_arm = true;
        self
    }

    /// Make `stop_and_release` fail (the handle is still released)
    pub fn with_failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Refuse to configure the channel with this index
    pub fn with_rejected_channel(mut self, index: u32) -> Self {
        self.rejected_channel = Some(index);
        self
    }

    /// Observation handle that stays valid after the device moves threads
    pub fn monitor(&self) -> SimulatedDaqMonitor {
        self.monitor.clone()
    }

    fn should_fail(&self, read_number: u64) -> bool {
        self.failing_reads.contains(&read_number)
            || self
                .fail_every
                .map(|n| (read_number + 1) % n == 0)
                .unwrap_or(false)
    }

    fn check_handle(&self, handle: TaskHandle) -> Result<(), AcquisitionError> {
        if self.active == Some(handle) {
            Ok(())
        } else {
            Err(AcquisitionError::InvalidHandle(handle.0))
        }
    }
}

impl DaqDevice for SimulatedDaq {
    fn channel_limits(&self) -> ChannelLimits {
        self.limits
    }

    fn configure_channel(&mut self, spec: &ChannelSpec) -> Result<(), ConfigurationError> {
        if self.active.is_some() {
            return Err(ConfigurationError::Device(
                "cannot add channels to a running task".to_string(),
            ));
        }
        let prefix = format!("{}/", self.device);
        if !spec.physical_channel.starts_with(&prefix) {
            return Err(ConfigurationError::Device(format!(
                "unknown device in '{}'",
                spec.physical_channel
            )));
        }
        if self.rejected_channel == Some(spec.index) {
            return Err(ConfigurationError::Device(format!(
                "channel {} unavailable",
                spec.physical_channel
            )));
        }
        if self.channels.iter().any(|c| c.index == spec.index) {
            return Err(ConfigurationError::ChannelInUse { index: spec.index });
        }

        tracing::debug!(
            "Simulated {}: configured {} ({}, {})",
            self.device,
            spec.physical_channel,
            spec.wiring,
            spec.role
        );
        self.channels.push(spec.clone());
        Ok(())
    }

    fn clear_channels(&mut self) {
        if self.active.is_none() {
            self.channels.clear();
        }
    }

    fn arm_and_start(&mut self) -> Result<TaskHandle, AcquisitionError> {
        if self.fail_arm {
            return Err(AcquisitionError::Start("simulated start failure".to_string()));
        }
        if let Some(active) = self.active {
            return Err(AcquisitionError::Start(format!("task {} already running", active)));
        }
        if self.channels.is_empty() {
            return Err(AcquisitionError::Start("no channels configured".to_string()));
        }

        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        self.active = Some(handle);
        self.sample_cursor = 0;
        self.stats.reset();
        self.monitor.inner.arms.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    fn read_batch(
        &mut self,
        handle: TaskHandle,
        samples: usize,
    ) -> Result<SampleBatch, AcquisitionError> {
        let read_number = self.monitor.inner.reads.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();

        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }

        if let Err(e) = self.check_handle(handle) {
            self.stats.record_failure();
            self.monitor.inner.failed_reads.fetch_add(1, Ordering::SeqCst);
            return Err(e);
        }
        if self.should_fail(read_number) {
            self.stats.record_failure();
            self.monitor.inner.failed_reads.fetch_add(1, Ordering::SeqCst);
            return Err(AcquisitionError::Read(format!(
                "simulated failure on read {}",
                read_number
            )));
        }

        let count = self.short_read.map(|n| n.min(samples)).unwrap_or(samples);
        let (min_v, max_v) = self.voltage_range;
        let mut channels = Vec::with_capacity(self.channels.len());
        for spec in &self.channels {
            let signal = self.signals.get(&spec.role).cloned().unwrap_or(ChannelSignal {
                pattern: SignalPattern::default(),
                noise_amplitude: 0.0,
            });
            let readings = (0..count as u64)
                .map(|i| {
                    let index = self.sample_cursor + i;
                    let t = index as f64 / self.sample_rate_hz.max(f64::MIN_POSITIVE);
                    signal.generate(index, t, &mut self.rng).clamp(min_v, max_v)
                })
                .collect();
            channels.push(readings);
        }
        self.sample_cursor += count as u64;

        let elapsed_us = start.elapsed().as_micros() as u64;
        self.stats
            .record_success(elapsed_us, (count * self.channels.len()) as u64);
        Ok(SampleBatch::new(channels))
    }

    fn stop_and_release(&mut self, handle: TaskHandle) -> Result<(), AcquisitionError> {
        self.monitor.inner.releases.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut released) = self.monitor.inner.released.lock() {
            released.push(handle);
        }

        self.check_handle(handle)?;
        self.active = None;
        self.channels.clear();

        if self.fail_release {
            return Err(AcquisitionError::Release {
                handle: handle.0,
                message: "simulated clear failure".to_string(),
            });
        }
        Ok(())
    }

    fn stats(&self) -> &SamplerStats {
        &self.stats
    }
}
