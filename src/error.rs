//! Error handling for tensile-daq
//!
//! Each failure kind of the acquisition core has its own enum so callers can
//! match on exactly what went wrong. [`DaqError`] wraps them all for the
//! boundary operations of [`AcquisitionLoop`](crate::backend::AcquisitionLoop).

use crate::types::LoopState;
use thiserror::Error;

/// Channel registration failures. Fatal to `configure`, never to a running loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// No channels were supplied
    #[error("no channels configured")]
    NoChannels,

    /// The physical channel (or its differential partner) is already claimed
    #[error("channel ai{index} is already in use")]
    ChannelInUse { index: u32 },

    /// Wiring mode not supported on this channel
    #[error("wiring mode {mode} is not valid for channel ai{index}")]
    InvalidWiring { index: u32, mode: String },

    /// Physical channel string does not name the channel index
    #[error("physical channel '{physical}' does not match channel index {index}")]
    InvalidPhysicalChannel { index: u32, physical: String },

    /// A required role has no channel
    #[error("no channel configured for {0}")]
    MissingRole(String),

    /// Two channels claim the same role
    #[error("more than one channel configured for {0}")]
    DuplicateRole(String),

    /// The device refused the channel
    #[error("device rejected channel: {0}")]
    Device(String),
}

/// Hardware start/read/stop failures. Reported per tick; the loop carries on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    /// Starting the device task failed
    #[error("failed to start acquisition task: {0}")]
    Start(String),

    /// Reading a batch failed
    #[error("read failed: {0}")]
    Read(String),

    /// Stopping/releasing the task failed
    #[error("failed to release task {handle}: {message}")]
    Release { handle: u64, message: String },

    /// The handle is unknown to the device or already released
    #[error("invalid task handle {0}")]
    InvalidHandle(u64),

    /// The read did not complete in time
    #[error("read timed out after {0} ms")]
    Timeout(u64),
}

/// Zero-offset calibration failures. The loop stays `Armed`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// The batch for a channel held no readings
    #[error("calibration batch for {0} channel is empty")]
    EmptyBatch(&'static str),

    /// A reading was NaN or infinite
    #[error("calibration batch for {channel} channel contains a non-finite reading ({value})")]
    InvalidSample { channel: &'static str, value: f64 },

    /// The calibration read itself failed
    #[error("calibration read failed: {0}")]
    Acquisition(#[from] AcquisitionError),
}

/// Invalid divisor in a stress or strain computation. The point is dropped.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum DomainError {
    /// Cross-sectional area is zero, negative or not finite
    #[error("cross-sectional area must be positive, got {0}")]
    NonPositiveArea(f64),

    /// Gauge length is zero, negative or not finite
    #[error("gauge length must be positive, got {0}")]
    NonPositiveGaugeLength(f64),
}

/// Externally supplied values that fail validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Geometry dimension is zero, negative or not finite
    #[error("{field} must be a positive finite number, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    /// A run cannot start without specimen geometry
    #[error("specimen geometry has not been set")]
    GeometryNotSet,
}

/// Operation not valid in the current lifecycle state
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot {operation} while {state}")]
pub struct StateError {
    pub operation: &'static str,
    pub state: LoopState,
}

impl StateError {
    pub fn new(operation: &'static str, state: LoopState) -> Self {
        Self { operation, state }
    }
}

/// Main error type for tensile-daq operations
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    /// The worker thread is gone or stopped answering
    #[error("Worker error: {0}")]
    Worker(String),

    /// Errors related to configuration files
    #[error("Config file error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DaqError>,
    },
}

impl DaqError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DaqError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers
    pub fn root(&self) -> &DaqError {
        match self {
            DaqError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for tensile-daq operations
pub type Result<T> = std::result::Result<T, DaqError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<DaqError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
