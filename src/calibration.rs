//! Zero-offset calibration
//!
//! Before a run the force and length channels are sampled with no load on
//! the specimen; the mean of each channel becomes the zero subtracted from
//! every later reading.

use crate::error::CalibrationError;
use crate::types::CalibrationOffsets;

/// Arithmetic mean of one channel's readings
///
/// Accumulated as deviations from the first reading, so a constant batch
/// averages to exactly that constant.
fn channel_mean(channel: &'static str, samples: &[f64]) -> Result<f64, CalibrationError> {
    if samples.is_empty() {
        return Err(CalibrationError::EmptyBatch(channel));
    }
    if let Some(&value) = samples.iter().find(|v| !v.is_finite()) {
        return Err(CalibrationError::InvalidSample { channel, value });
    }
    let origin = samples[0];
    let deviation: f64 = samples.iter().map(|v| v - origin).sum();
    Ok(origin + deviation / samples.len() as f64)
}

/// Average a batch of force and length readings into zero offsets
///
/// Each slice must hold at least one finite reading. Short batches are
/// averaged over whatever count the device actually returned.
pub fn compute_offsets(
    force_samples: &[f64],
    length_samples: &[f64],
) -> Result<CalibrationOffsets, CalibrationError> {
    Ok(CalibrationOffsets {
        stress_zero: channel_mean("force", force_samples)?,
        strain_zero: channel_mean("length", length_samples)?,
    })
}
