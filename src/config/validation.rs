//! Configuration validation.

use crate::axis::Axis;
use crate::error::{ConfigError, Error, Result};

use super::EngineConfig;

/// Valid microstep divisors for the MS1/MS2 pin pairs.
const VALID_MICROSTEP_MODES: [u8; 5] = [1, 2, 4, 8, 16];

/// Validate a parsed configuration.
///
/// Checks:
/// - Every axis has a positive steps-per-unit
/// - Microstep modes map onto the driver pins
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    for axis in Axis::ALL {
        let value = config.axes.axis(axis).steps_per_unit;
        if !(value > 0.0) {
            return Err(Error::Config(ConfigError::InvalidStepsPerUnit {
                axis: axis.letter(),
                value,
            }));
        }
    }

    for &mode in &config.drivers.microstep_modes {
        if !VALID_MICROSTEP_MODES.contains(&mode) {
            return Err(Error::Config(ConfigError::InvalidMicrostepMode(mode)));
        }
    }

    Ok(())
}
