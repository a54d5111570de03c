//! Unit conversion and stress/strain derivation
//!
//! Everything here is pure. The per-sample path is split into stages so that
//! a unit-system change never touches the stress/strain formulas:
//!
//! ```text
//! volts ──raw_to_force/raw_to_length──▶ (lbf, in)
//!       ──to_unit_system──▶ (kip, in) | (N, mm)
//!       ──calculate_stress/calculate_strain──▶ (ksi, -) | (MPa, -)
//! ```
//!
//! [`SamplePipeline`] wires the stages together for the acquisition worker.

use crate::error::DomainError;
use crate::types::{CalibrationOffsets, SeriesPoint, SpecimenGeometry, UnitSystem};

/// Load cell transfer function
pub const LBS_PER_VOLT: f64 = 1960.574197;

/// Extensometer transfer function
pub const INCHES_PER_VOLT: f64 = 0.041814743;

/// Newtons per pound-force
pub const NEWTONS_PER_POUND: f64 = 4.448_221_615_260_5;

/// Millimetres per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Square millimetres per square inch
pub const MM2_PER_IN2: f64 = MM_PER_INCH * MM_PER_INCH;

/// Pounds per kip
pub const POUNDS_PER_KIP: f64 = 1000.0;

/// MPa per ksi (N/mm² per kip/in²)
pub const MPA_PER_KSI: f64 = NEWTONS_PER_POUND * POUNDS_PER_KIP / MM2_PER_IN2;

/// Load cell volts to pound-force
#[inline]
pub fn raw_to_force(volts: f64, offset: f64) -> f64 {
    LBS_PER_VOLT * (volts - offset)
}

/// Extensometer volts to inches
#[inline]
pub fn raw_to_length(volts: f64, offset: f64) -> f64 {
    INCHES_PER_VOLT * (volts - offset)
}

/// Scale `value` by `factor` going English → Metric and by its inverse the other way
#[inline]
fn scale(from: UnitSystem, to: UnitSystem, value: f64, factor: f64) -> f64 {
    match (from, to) {
        (UnitSystem::English, UnitSystem::Metric) => value * factor,
        (UnitSystem::Metric, UnitSystem::English) => value / factor,
        _ => value,
    }
}

/// Pound-force ↔ newtons
pub fn convert_force(from: UnitSystem, to: UnitSystem, value: f64) -> f64 {
    scale(from, to, value, NEWTONS_PER_POUND)
}

/// Inches ↔ millimetres
pub fn convert_length(from: UnitSystem, to: UnitSystem, value: f64) -> f64 {
    scale(from, to, value, MM_PER_INCH)
}

/// Square inches ↔ square millimetres
pub fn convert_area(from: UnitSystem, to: UnitSystem, value: f64) -> f64 {
    scale(from, to, value, MM2_PER_IN2)
}

/// ksi ↔ MPa
///
/// Used to rescale an existing series when the unit system changes.
pub fn convert_pressure(from: UnitSystem, to: UnitSystem, value: f64) -> f64 {
    scale(from, to, value, MPA_PER_KSI)
}

/// `force / area`
pub fn calculate_stress(force: f64, area: f64) -> Result<f64, DomainError> {
    if !(area.is_finite() && area > 0.0) {
        return Err(DomainError::NonPositiveArea(area));
    }
    Ok(force / area)
}

/// `elongation / gauge_length`
pub fn calculate_strain(elongation: f64, gauge_length: f64) -> Result<f64, DomainError> {
    if !(gauge_length.is_finite() && gauge_length > 0.0) {
        return Err(DomainError::NonPositiveGaugeLength(gauge_length));
    }
    Ok(elongation / gauge_length)
}

/// Express force (lbf) and elongation (in) in the display units of `system`
///
/// English reports force in kips; Metric converts force to newtons and
/// elongation to millimetres.
pub fn to_unit_system(system: UnitSystem, force_lbs: f64, elongation_in: f64) -> (f64, f64) {
    match system {
        UnitSystem::English => (force_lbs / POUNDS_PER_KIP, elongation_in),
        UnitSystem::Metric => (
            convert_force(UnitSystem::English, UnitSystem::Metric, force_lbs),
            convert_length(UnitSystem::English, UnitSystem::Metric, elongation_in),
        ),
    }
}

/// Raw voltage pair → series point for one run configuration
///
/// Geometry is resolved into the active unit system once, when the pipeline
/// is built, so the per-sample path is two subtractions, two multiplies and
/// two divides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePipeline {
    offsets: CalibrationOffsets,
    system: UnitSystem,
    area: f64,
    gauge_length: f64,
}

impl SamplePipeline {
    pub fn new(offsets: CalibrationOffsets, system: UnitSystem, geometry: &SpecimenGeometry) -> Self {
        Self {
            offsets,
            system,
            area: geometry.area_in(system),
            gauge_length: geometry.gauge_length_in(system),
        }
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.system
    }

    pub fn offsets(&self) -> CalibrationOffsets {
        self.offsets
    }

    /// Convert one force/length voltage pair
    pub fn convert(&self, force_volts: f64, length_volts: f64) -> Result<SeriesPoint, DomainError> {
        let force_lbs = raw_to_force(force_volts, self.offsets.stress_zero);
        let elongation_in = raw_to_length(length_volts, self.offsets.strain_zero);
        let (force, elongation) = to_unit_system(self.system, force_lbs, elongation_in);

        let stress = calculate_stress(force, self.area)?;
        let strain = calculate_strain(elongation, self.gauge_length)?;
        Ok(SeriesPoint::new(strain, stress))
    }
}
