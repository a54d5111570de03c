//! # tensile-daq: Tensile-test data acquisition
//!
//! Samples a load cell and an extensometer through a DAQ device at a fixed
//! cadence, converts the voltages into calibrated stress and strain, and
//! publishes the points to a live series a plot can read from any thread.
//!
//! ## Architecture
//!
//! - **Backend**: the acquisition loop, its worker thread and the hardware
//!   sampling interface
//! - **Units**: pure conversions from volts to force/length to stress/strain
//! - **Calibration**: zero offsets averaged from an unloaded batch
//! - **Series**: the shared, append-only stress-strain series
//! - **Communication**: crossbeam channels between controller and worker
//!
//! ## Configuration
//!
//! Rig configuration is stored in the platform-appropriate data directory
//! under `dev.tensile-daq`:
//!
//! - **Linux**: `~/.local/share/dev.tensile-daq/`
//! - **macOS**: `~/Library/Application Support/dev.tensile-daq/`
//! - **Windows**: `%APPDATA%\dev.tensile-daq\`
//!
//! ## Example
//!
//! ```ignore
//! use tensile_daq::{AcquisitionLoop, AppConfig, SimulatedDaq};
//!
//! let config = AppConfig::load_or_default(AppConfig::default_path()?);
//! let mut daq = AcquisitionLoop::new(
//!     Box::new(SimulatedDaq::from_hardware_config(&config.hardware)),
//!     config.acquisition.clone(),
//! );
//! daq.configure(config.channels.clone())?;
//! daq.set_geometry(config.specimen_geometry()??)?;
//! daq.calibrate()?;
//! daq.start()?;
//! ```

pub mod backend;
pub mod calibration;
pub mod config;
pub mod error;
pub mod series;
pub mod types;
pub mod units;

// Re-export commonly used types
pub use backend::{AcquisitionEvent, AcquisitionLoop, DaqDevice, SimulatedDaq};
pub use config::AppConfig;
pub use error::{DaqError, Result};
pub use series::LiveSeries;
pub use types::{
    CalibrationOffsets, ChannelSpec, LoopState, SeriesPoint, SpecimenGeometry, UnitSystem,
};
