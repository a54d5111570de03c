//! Integration tests for the acquisition loop lifecycle
//!
//! These run the real worker thread against the simulated device.

mod common;

use common::builders::{rig_channels, unit_geometry, ChannelSpecBuilder};
use common::daq_helpers::{armed_loop, fast_config, wide_range_hardware, TEST_AVERAGING};
use common::{assert_float_eq, test_timeout, wait_until};
use std::time::{Duration, Instant};
use tensile_daq::backend::{AcquisitionEvent, AcquisitionLoop, SignalPattern, SimulatedDaq};
use tensile_daq::error::{ConfigurationError, DaqError, StateError, ValidationError};
use tensile_daq::types::{CalibrationOffsets, ChannelRole, LoopState, SpecimenGeometry, UnitSystem};
use tensile_daq::units::{INCHES_PER_VOLT, LBS_PER_VOLT, MPA_PER_KSI};

/// Device whose first `TEST_AVERAGING` samples sit at the zero voltages and
/// every later sample reads 10 lbf and 1 in above them
fn calibration_scenario_device() -> SimulatedDaq {
    let mut force = vec![1.0; TEST_AVERAGING];
    force.push(1.0 + 10.0 / LBS_PER_VOLT);
    let mut length = vec![0.5; TEST_AVERAGING];
    length.push(0.5 + 1.0 / INCHES_PER_VOLT);

    SimulatedDaq::from_hardware_config(&wide_range_hardware())
        .with_pattern(ChannelRole::Force, SignalPattern::Sequence(force))
        .with_pattern(ChannelRole::Elongation, SignalPattern::Sequence(length))
}

fn constant_device() -> SimulatedDaq {
    SimulatedDaq::new()
        .with_pattern(ChannelRole::Force, SignalPattern::Constant(0.5))
        .with_pattern(ChannelRole::Elongation, SignalPattern::Constant(0.25))
}

#[test]
fn test_calibrated_run_english() {
    let (mut daq, _) = armed_loop(calibration_scenario_device());
    // 10 lbf over 0.001 in² is 10 ksi
    daq.set_geometry(SpecimenGeometry::new(0.001, 1.0, UnitSystem::English).unwrap())
        .unwrap();

    let offsets = daq.calibrate().unwrap();
    assert_eq!(offsets.stress_zero, 1.0);
    assert_eq!(offsets.strain_zero, 0.5);
    assert_eq!(daq.offsets(), offsets);

    daq.start().unwrap();
    let series = daq.series();
    assert!(wait_until(test_timeout(), || series.len() >= TEST_AVERAGING));
    daq.pause().unwrap();

    for point in series.snapshot() {
        assert_float_eq(point.strain, 1.0, 1e-9);
        assert_float_eq(point.stress, 10.0, 1e-9);
    }
    assert!(daq
        .drain_events()
        .iter()
        .any(|e| matches!(e, AcquisitionEvent::Calibrated(_))));
}

#[test]
fn test_calibrated_run_metric() {
    let (mut daq, _) = armed_loop(calibration_scenario_device());
    daq.set_geometry(SpecimenGeometry::new(0.001, 1.0, UnitSystem::English).unwrap())
        .unwrap();
    daq.set_unit_system(UnitSystem::Metric, false).unwrap();
    daq.calibrate().unwrap();

    daq.start().unwrap();
    let series = daq.series();
    assert!(wait_until(test_timeout(), || !series.is_empty()));
    daq.pause().unwrap();

    let point = series.snapshot()[0];
    assert_float_eq(point.strain, 1.0, 1e-9);
    assert_float_eq(point.stress, 10.0 * MPA_PER_KSI, 1e-9);
}

#[test]
fn test_uncalibrated_run_uses_zero_offsets() {
    let (mut daq, _) = armed_loop(constant_device());
    daq.set_geometry(unit_geometry()).unwrap();
    daq.start().unwrap();

    let series = daq.series();
    assert!(wait_until(test_timeout(), || !series.is_empty()));
    daq.pause().unwrap();

    let point = series.snapshot()[0];
    assert_float_eq(point.stress, LBS_PER_VOLT * 0.5 / 1000.0, 1e-12);
    assert_float_eq(point.strain, INCHES_PER_VOLT * 0.25, 1e-12);
}

#[test]
fn test_pause_then_terminate() {
    let (mut daq, monitor) = armed_loop(constant_device());
    daq.set_geometry(unit_geometry()).unwrap();
    daq.start().unwrap();

    let series = daq.series();
    assert!(wait_until(test_timeout(), || series.len() >= 2 * TEST_AVERAGING));
    daq.pause().unwrap();
    assert_eq!(daq.state(), LoopState::Paused);

    let paused_len = series.len();
    let reads = monitor.read_count();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(series.len(), paused_len);
    assert_eq!(monitor.read_count(), reads);

    let started = Instant::now();
    daq.terminate().unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(daq.state(), LoopState::Terminated);
    assert_eq!(series.len(), paused_len);
    assert_eq!(monitor.release_count(), 1);

    let events = daq.drain_events();
    assert!(events.iter().any(|e| matches!(e, AcquisitionEvent::Shutdown)));
}

#[test]
fn test_pause_during_read_completes_tick() {
    // Each read outlasts several poll periods
    let (mut daq, monitor) =
        armed_loop(constant_device().with_read_delay(Duration::from_millis(40)));
    daq.set_geometry(unit_geometry()).unwrap();
    daq.start().unwrap();

    assert!(wait_until(test_timeout(), || monitor.read_count() >= 1));
    daq.pause().unwrap();
    assert_eq!(daq.state(), LoopState::Paused);

    let series = daq.series();
    let paused_len = series.len();
    let reads = monitor.read_count();
    assert!(paused_len >= TEST_AVERAGING);
    assert_eq!(paused_len % TEST_AVERAGING, 0);
    assert_eq!(paused_len, reads as usize * TEST_AVERAGING);

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(monitor.read_count(), reads);
    assert_eq!(series.len(), paused_len);
}

#[test]
fn test_geometry_fixed_while_paused() {
    let (mut daq, _) = armed_loop(constant_device());
    daq.set_geometry(unit_geometry()).unwrap();
    daq.start().unwrap();

    let series = daq.series();
    assert!(wait_until(test_timeout(), || series.len() >= TEST_AVERAGING));
    daq.pause().unwrap();

    let halved = SpecimenGeometry::new(0.5, 1.0, UnitSystem::English).unwrap();
    assert!(matches!(
        daq.set_geometry(halved),
        Err(DaqError::State(StateError {
            state: LoopState::Paused,
            ..
        }))
    ));
    assert_eq!(daq.geometry(), Some(unit_geometry()));

    let paused_len = series.len();
    daq.start().unwrap();
    assert!(wait_until(test_timeout(), || series.len() >= paused_len + TEST_AVERAGING));
    daq.pause().unwrap();

    let points = series.snapshot();
    let first = points[0].stress;
    for point in &points {
        assert_float_eq(point.stress, first, 1e-12);
    }

    // Allowed again once the run has ended
    daq.end_run().unwrap();
    daq.set_geometry(halved).unwrap();
    assert_eq!(daq.geometry(), Some(halved));
}

#[test]
fn test_terminate_while_running_is_prompt() {
    let device = constant_device();
    let monitor = device.monitor();
    let mut config = fast_config();
    config.poll_period_ms = 10_000;
    let mut daq = AcquisitionLoop::new(Box::new(device), config);
    daq.configure(rig_channels()).unwrap();
    daq.set_geometry(unit_geometry()).unwrap();
    daq.start().unwrap();

    let started = Instant::now();
    daq.terminate().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(monitor.read_count(), 0);
    assert_eq!(monitor.release_count(), 1);
}

#[test]
fn test_failed_read_is_isolated() {
    let (mut daq, monitor) = armed_loop(constant_device().with_failing_reads([1]));
    daq.set_geometry(unit_geometry()).unwrap();
    daq.start().unwrap();

    assert!(wait_until(test_timeout(), || monitor.read_count() >= 4));
    assert_eq!(daq.state(), LoopState::Running);
    daq.pause().unwrap();

    let successful = monitor.read_count() - monitor.failed_read_count();
    assert_eq!(monitor.failed_read_count(), 1);
    assert_eq!(daq.series().len() as u64, successful * TEST_AVERAGING as u64);

    let events = daq.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, AcquisitionEvent::TickFailed { tick: 2, .. })));
}

#[test]
fn test_repeated_failures_never_terminate() {
    let (mut daq, monitor) = armed_loop(constant_device().with_fail_every(1));
    daq.set_geometry(unit_geometry()).unwrap();
    daq.start().unwrap();

    assert!(wait_until(test_timeout(), || monitor.read_count() >= 6));
    assert_eq!(daq.state(), LoopState::Running);
    daq.pause().unwrap();

    assert!(daq.series().is_empty());
    let warnings: Vec<u64> = daq
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            AcquisitionEvent::RepeatedFailures { consecutive } => Some(consecutive),
            _ => None,
        })
        .collect();
    assert!(warnings.starts_with(&[3, 6]));
}

#[test]
fn test_unit_change_rescales_existing_series() {
    let (mut daq, _) = armed_loop(constant_device());
    daq.set_geometry(unit_geometry()).unwrap();
    daq.start().unwrap();

    let series = daq.series();
    assert!(wait_until(test_timeout(), || series.len() >= 2 * TEST_AVERAGING));
    daq.pause().unwrap();
    let before = series.snapshot();

    daq.set_unit_system(UnitSystem::Metric, true).unwrap();
    let after = series.snapshot();
    assert_eq!(before.len(), after.len());
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.strain, new.strain);
        assert_float_eq(new.stress, old.stress * MPA_PER_KSI, 1e-9);
    }

    // new samples arrive in the new system too
    daq.start().unwrap();
    assert!(wait_until(test_timeout(), || series.len() > after.len()));
    daq.pause().unwrap();
    let latest = series.last().unwrap();
    assert_float_eq(latest.stress, after[0].stress, 1e-9);
}

#[test]
fn test_end_run_recalibrate_and_clear() {
    let (mut daq, monitor) = armed_loop(constant_device());
    daq.set_geometry(unit_geometry()).unwrap();
    daq.start().unwrap();
    let series = daq.series();
    assert!(wait_until(test_timeout(), || !series.is_empty()));

    daq.end_run().unwrap();
    assert_eq!(daq.state(), LoopState::Armed);

    let offsets = daq.calibrate().unwrap();
    assert_float_eq(offsets.stress_zero, 0.5, 1e-12);
    assert_float_eq(offsets.strain_zero, 0.25, 1e-12);

    daq.clear_series().unwrap();
    assert!(series.is_empty());

    daq.start().unwrap();
    assert!(wait_until(test_timeout(), || !series.is_empty()));
    daq.pause().unwrap();
    let point = series.snapshot()[0];
    assert_float_eq(point.stress, 0.0, 1e-12);
    assert_float_eq(point.strain, 0.0, 1e-12);

    daq.terminate().unwrap();
    assert_eq!(monitor.arm_count(), 1);
    assert_eq!(monitor.release_count(), 1);
}

#[test]
fn test_short_reads_are_converted() {
    let (mut daq, _) = armed_loop(constant_device().with_short_reads(1));
    daq.set_geometry(unit_geometry()).unwrap();

    // short calibration batch averages what came back
    let offsets = daq.calibrate().unwrap();
    assert_float_eq(offsets.stress_zero, 0.5, 1e-12);

    daq.start().unwrap();
    let series = daq.series();
    assert!(wait_until(test_timeout(), || series.len() >= 3));
    daq.pause().unwrap();
}

#[test]
fn test_calibration_failure_keeps_state() {
    let (mut daq, _) = armed_loop(constant_device().with_failing_reads([0]));
    assert!(matches!(daq.calibrate(), Err(DaqError::Calibration(_))));
    assert_eq!(daq.state(), LoopState::Armed);
    assert_eq!(daq.offsets(), CalibrationOffsets::default());

    assert!(daq.calibrate().is_ok());
}

#[test]
fn test_readers_see_whole_ticks() {
    let (mut daq, _) = armed_loop(constant_device());
    daq.set_geometry(unit_geometry()).unwrap();
    daq.start().unwrap();

    let series = daq.series();
    let reader = std::thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_millis(100);
        while Instant::now() < deadline {
            assert_eq!(series.snapshot().len() % TEST_AVERAGING, 0);
        }
    });
    reader.join().unwrap();
    daq.terminate().unwrap();
}

#[test]
fn test_start_without_geometry_fails() {
    let (mut daq, _) = armed_loop(constant_device());
    assert!(matches!(
        daq.start(),
        Err(DaqError::Validation(ValidationError::GeometryNotSet))
    ));
}

#[test]
fn test_failed_configure_releases_nothing() {
    let device = constant_device().with_rejected_channel(1);
    let monitor = device.monitor();
    let mut daq = AcquisitionLoop::new(Box::new(device), fast_config());

    let err = daq.configure(rig_channels()).unwrap_err();
    assert!(matches!(
        err,
        DaqError::Configuration(ConfigurationError::Device(_))
    ));
    assert_eq!(daq.state(), LoopState::Idle);
    drop(daq);
    assert_eq!(monitor.arm_count(), 0);
    assert_eq!(monitor.release_count(), 0);
}

#[test]
fn test_reconfigure_after_validation_failure() {
    let device = constant_device();
    let monitor = device.monitor();
    let mut daq = AcquisitionLoop::new(Box::new(device), fast_config());

    let clash = vec![
        ChannelSpecBuilder::force(0).build(),
        ChannelSpecBuilder::elongation(4).build(),
    ];
    assert!(matches!(
        daq.configure(clash),
        Err(DaqError::Configuration(ConfigurationError::ChannelInUse { index: 4 }))
    ));

    daq.configure(rig_channels()).unwrap();
    assert_eq!(daq.state(), LoopState::Armed);
    drop(daq);
    assert_eq!(monitor.release_count(), 1);
}

#[test]
fn test_release_failure_does_not_fail_terminate() {
    let (mut daq, monitor) = armed_loop(constant_device().with_failing_release());
    daq.terminate().unwrap();
    daq.terminate().unwrap();
    assert_eq!(monitor.release_count(), 1);
    assert!(daq
        .drain_events()
        .iter()
        .any(|e| matches!(e, AcquisitionEvent::ReleaseFailed(_))));
}

#[test]
fn test_terminate_from_idle() {
    let mut daq = AcquisitionLoop::new(Box::new(constant_device()), fast_config());
    daq.terminate().unwrap();
    assert_eq!(daq.state(), LoopState::Terminated);
    assert!(daq.configure(rig_channels()).is_err());
}
