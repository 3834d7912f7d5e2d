//! Engine configuration.
//!
//! Pin polarities, endstop wiring, driver currents and the dual-axis
//! layout are deserializable structures here, loadable from TOML (with `std`) or
//! built in code via [`EngineConfig::default`] on configless targets.

#[cfg(feature = "std")]
mod loader;
mod validation;

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};
pub use validation::validate_config;

use serde::Deserialize;

use crate::axis::{Axis, EndstopSide, DRIVER_COUNT};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Per-axis mechanics and wiring.
    #[serde(default)]
    pub axes: AxesConfig,

    /// Behavioral options.
    #[serde(default)]
    pub options: Options,

    /// Driver current and microstep setup.
    #[serde(default)]
    pub drivers: DriverConfig,

    /// Dual-driver axis layout.
    #[serde(default)]
    pub dual: DualConfig,
}

/// The four logical axes.
#[derive(Debug, Clone, Deserialize)]
pub struct AxesConfig {
    /// X carriage.
    #[serde(default = "AxisConfig::default_xy")]
    pub x: AxisConfig,
    /// Y carriage.
    #[serde(default = "AxisConfig::default_xy")]
    pub y: AxisConfig,
    /// Z carriage.
    #[serde(default = "AxisConfig::default_z")]
    pub z: AxisConfig,
    /// Extruder.
    #[serde(default = "AxisConfig::default_e")]
    pub e: AxisConfig,
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self {
            x: AxisConfig::default_xy(),
            y: AxisConfig::default_xy(),
            z: AxisConfig::default_z(),
            e: AxisConfig::default_e(),
        }
    }
}

impl AxesConfig {
    /// Configuration for one axis.
    #[inline]
    pub fn axis(&self, axis: Axis) -> &AxisConfig {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
            Axis::E => &self.e,
        }
    }

    /// Steps-per-unit table in axis order, for position reporting.
    pub fn steps_per_unit(&self) -> [f32; 4] {
        [
            self.x.steps_per_unit,
            self.y.steps_per_unit,
            self.z.steps_per_unit,
            self.e.steps_per_unit,
        ]
    }
}

/// Mechanics and wiring of one axis.
#[derive(Debug, Clone, Deserialize)]
pub struct AxisConfig {
    /// Steps per millimetre of travel (per degree for rotary axes).
    pub steps_per_unit: f32,

    /// Invert the DIR line.
    #[serde(default)]
    pub invert_dir: bool,

    /// STEP line idles high (pulses are active-low).
    #[serde(default)]
    pub invert_step_pin: bool,

    /// Endstop at the negative end of travel.
    #[serde(default)]
    pub endstop_min: EndstopConfig,

    /// Endstop at the positive end of travel.
    #[serde(default)]
    pub endstop_max: EndstopConfig,
}

impl AxisConfig {
    fn default_xy() -> Self {
        Self {
            steps_per_unit: 80.0,
            invert_dir: false,
            invert_step_pin: false,
            endstop_min: EndstopConfig {
                present: true,
                ..EndstopConfig::default()
            },
            endstop_max: EndstopConfig::default(),
        }
    }

    fn default_z() -> Self {
        Self {
            steps_per_unit: 400.0,
            ..Self::default_xy()
        }
    }

    fn default_e() -> Self {
        Self {
            steps_per_unit: 100.0,
            invert_dir: false,
            invert_step_pin: false,
            endstop_min: EndstopConfig::default(),
            endstop_max: EndstopConfig::default(),
        }
    }

    /// Configuration of one of this axis's endstops.
    #[inline]
    pub fn endstop(&self, side: EndstopSide) -> &EndstopConfig {
        match side {
            EndstopSide::Min => &self.endstop_min,
            EndstopSide::Max => &self.endstop_max,
        }
    }
}

/// One endstop switch.
#[derive(Debug, Clone, Deserialize)]
pub struct EndstopConfig {
    /// The switch is wired.
    #[serde(default)]
    pub present: bool,

    /// Invert the triggered level (normally-closed wiring).
    #[serde(default)]
    pub invert: bool,

    /// Enable the input pull-up.
    #[serde(default = "default_true")]
    pub pullup: bool,
}

impl Default for EndstopConfig {
    fn default() -> Self {
        Self {
            present: false,
            invert: false,
            pullup: true,
        }
    }
}

/// Behavioral options.
#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    /// Keep endstop checks disabled except while homing.
    #[serde(default = "default_true")]
    pub endstops_only_for_homing: bool,

    /// An endstop hit outside homing should abort the print (applied by
    /// the application's housekeeping path).
    #[serde(default)]
    pub abort_on_endstop_hit: bool,

    /// Assert the Z driver enable only when a block with Z motion starts,
    /// then wait 1 ms before pulsing.
    #[serde(default)]
    pub late_z_enable: bool,

    /// Couple the extrusion solenoid valves to E-axis motion.
    #[serde(default)]
    pub valve_coupling: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            endstops_only_for_homing: true,
            abort_on_endstop_hit: false,
            late_z_enable: false,
            valve_coupling: false,
        }
    }
}

/// Driver current and microstep setup, indexed X, Y, Z, E0, E1.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Digipot wiper value per driver.
    #[serde(default = "default_currents")]
    pub digipot_currents: [u8; DRIVER_COUNT],

    /// Microstep divisor per driver (1, 2, 4, 8 or 16).
    #[serde(default = "default_microsteps")]
    pub microstep_modes: [u8; DRIVER_COUNT],
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            digipot_currents: default_currents(),
            microstep_modes: default_microsteps(),
        }
    }
}

/// Dual-driver axis layout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DualConfig {
    /// Two X carriages sharing the logical X axis.
    #[serde(default)]
    pub x_carriage: bool,

    /// Two Z drivers stepping together.
    #[serde(default)]
    pub z_drivers: bool,
}

fn default_true() -> bool {
    true
}

fn default_currents() -> [u8; DRIVER_COUNT] {
    [135; DRIVER_COUNT]
}

fn default_microsteps() -> [u8; DRIVER_COUNT] {
    [16; DRIVER_COUNT]
}
