//! Unified error type for loopgauge.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging.
//!
//! The menu and animation state machines never fail; these errors come
//! from the collaborators around them (flash, sensor, LED driver).

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Storage
    /// Flash read/write/erase failed.
    Storage,

    /// The settings record no longer fits its buffer or map.
    StorageFull,

    /// A stored settings record could not be decoded.
    Corrupt,

    // Sensor
    /// Shunt/reference parameters put 4 mA or 20 mA outside the ADC range.
    SensorRange,

    /// A calibration would leave the lower bound at or above the upper bound.
    InvalidCalibration,

    // LED strip
    /// The strip driver rejected a frame.
    Led,

    // Generic
    /// Buffer too small for the requested operation.
    BufferOverflow,
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;
