//! Test to verify test infrastructure works correctly

mod common;

use common::builders::{rig_channels, ChannelSpecBuilder};
use common::daq_helpers::{armed_loop, TEST_AVERAGING};
use tensile_daq::backend::SimulatedDaq;
use tensile_daq::types::{ChannelRole, LoopState, WiringMode};

#[test]
fn test_infrastructure_setup() {
    // Test that builders work
    let spec = ChannelSpecBuilder::elongation(6)
        .wiring(WiringMode::ReferencedSingleEnded)
        .build();

    assert_eq!(spec.physical_channel, "Dev1/ai6");
    assert_eq!(spec.index, 6);
    assert_eq!(spec.role, ChannelRole::Elongation);
    assert_eq!(rig_channels().len(), 2);
}

#[test]
fn test_armed_loop_helper() {
    let (daq, monitor) = armed_loop(SimulatedDaq::new());
    assert_eq!(daq.state(), LoopState::Armed);
    assert_eq!(daq.config().averaging_factor, TEST_AVERAGING);
    assert_eq!(monitor.arm_count(), 1);
}

#[test]
fn test_wait_until() {
    assert!(common::wait_until(common::test_timeout(), || true));
    assert!(!common::wait_until(std::time::Duration::from_millis(5), || false));
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}
