//! Error types for the step pulse engine.
//!
//! Unified error handling across configuration and planner-facing block
//! validation. Runtime faults inside the interrupt path are never surfaced
//! as errors; they latch diagnostics that mainline housekeeping reports.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all fallible engine operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// A motion block violated its invariants
    Block(BlockError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// Steps-per-unit must be positive
    InvalidStepsPerUnit {
        /// Axis letter
        axis: char,
        /// Offending value
        value: f32,
    },
    /// Microstep mode not supported by the driver pins (1, 2, 4, 8, 16)
    InvalidMicrostepMode(u8),
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Block invariant violations.
///
/// A block failing these checks was produced by a broken planner; the
/// engine skips it at load time rather than executing garbage.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockError {
    /// No axis has any steps
    Empty,
    /// `step_event_count` does not equal the dominant axis step count
    EventCountMismatch {
        /// Declared event count
        declared: u32,
        /// Largest per-axis step count
        dominant: u32,
    },
    /// Phase boundaries out of order or past the end of the block
    PhaseOutOfRange {
        /// Step index where cruise begins
        accelerate_until: u32,
        /// Step index where deceleration begins
        decelerate_after: u32,
        /// Total step events in the block
        step_event_count: u32,
    },
    /// Entry or exit rate exceeds the cruise rate
    RatesOutOfOrder {
        /// Entry rate in steps/s
        initial_rate: u32,
        /// Exit rate in steps/s
        final_rate: u32,
        /// Cruise rate in steps/s
        nominal_rate: u32,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Block(e) => write!(f, "Block error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::InvalidStepsPerUnit { axis, value } => {
                write!(f, "Invalid steps per unit on {}: {}. Must be > 0", axis, value)
            }
            ConfigError::InvalidMicrostepMode(v) => {
                write!(f, "Invalid microstep mode: {}. Valid values: 1, 2, 4, 8, 16", v)
            }
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::Empty => write!(f, "Block has no steps on any axis"),
            BlockError::EventCountMismatch { declared, dominant } => {
                write!(
                    f,
                    "step_event_count {} does not match dominant axis count {}",
                    declared, dominant
                )
            }
            BlockError::PhaseOutOfRange {
                accelerate_until,
                decelerate_after,
                step_event_count,
            } => {
                write!(
                    f,
                    "Phase boundaries {}..{} invalid for {} step events",
                    accelerate_until, decelerate_after, step_event_count
                )
            }
            BlockError::RatesOutOfOrder {
                initial_rate,
                final_rate,
                nominal_rate,
            } => {
                write!(
                    f,
                    "Entry/exit rates {}/{} exceed nominal rate {}",
                    initial_rate, final_rate, nominal_rate
                )
            }
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<BlockError> for Error {
    fn from(e: BlockError) -> Self {
        Error::Block(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for BlockError {}
