//! Serial-surface message formatting.
//!
//! The interrupt path never prints; mainline housekeeping reads the
//! latched state and writes these messages to whatever
//! [`core::fmt::Write`] sink backs the serial channel.

use core::fmt::{self, Write};

use crate::axis::{Axis, AXIS_COUNT, DRIVER_COUNT, ENDSTOP_AXES};
use crate::board::StepperBoard;

/// Labels for the five driver slots.
const DRIVER_LABELS: [&str; DRIVER_COUNT] = ["X", "Y", "Z", "E0", "E1"];

/// `echo: endstops hit: X:<mm> Y:<mm> Z:<mm>`; only hit axes appear.
pub fn endstops_hit<W: Write>(
    out: &mut W,
    hit: &[bool; ENDSTOP_AXES],
    trigsteps: &[i32; ENDSTOP_AXES],
    steps_per_unit: &[f32; AXIS_COUNT],
) -> fmt::Result {
    write!(out, "echo: endstops hit:")?;
    for axis in Axis::CARTESIAN {
        let i = axis.index();
        if hit[i] {
            write!(
                out,
                " {}:{:.2}",
                axis.letter(),
                trigsteps[i] as f32 / steps_per_unit[i]
            )?;
        }
    }
    writeln!(out)
}

/// `Steprate too high: <rate>`: the rate table hit its interval floor.
pub fn steprate_too_high<W: Write>(out: &mut W, rate: u32) -> fmt::Result {
    writeln!(out, "Steprate too high: {}", rate)
}

/// MS1/MS2 pin readback for all five drivers.
pub fn microstep_pins<W: Write, B: StepperBoard>(out: &mut W, board: &mut B) -> fmt::Result {
    writeln!(out, "MS1,MS2 Pins")?;
    for (driver, label) in DRIVER_LABELS.iter().enumerate() {
        let (ms1, ms2) = board.read_microstep_pins(driver);
        writeln!(out, "{}: {} {}", label, ms1 as u8, ms2 as u8)?;
    }
    Ok(())
}
