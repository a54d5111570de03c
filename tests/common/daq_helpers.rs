//! Acquisition loop construction helpers

use super::builders::rig_channels;
use tensile_daq::backend::{AcquisitionLoop, SimulatedDaq, SimulatedDaqMonitor};
use tensile_daq::config::{AcquisitionConfig, HardwareConfig};

/// Samples per channel per tick in tests
pub const TEST_AVERAGING: usize = 4;

/// Fast cadence so integration tests finish quickly
pub fn fast_config() -> AcquisitionConfig {
    AcquisitionConfig {
        poll_period_ms: 5,
        averaging_factor: TEST_AVERAGING,
        stats_interval_ms: 20,
        failure_report_threshold: 3,
        ..AcquisitionConfig::default()
    }
}

/// Hardware with an input range wide enough for whole-inch elongations
pub fn wide_range_hardware() -> HardwareConfig {
    HardwareConfig {
        min_voltage: -100.0,
        max_voltage: 100.0,
        ..HardwareConfig::default()
    }
}

/// Configure `device` with the rig channels and return the armed loop
pub fn armed_loop(device: SimulatedDaq) -> (AcquisitionLoop, SimulatedDaqMonitor) {
    let monitor = device.monitor();
    let mut daq = AcquisitionLoop::new(Box::new(device), fast_config());
    daq.configure(rig_channels()).expect("configure rig channels");
    (daq, monitor)
}
