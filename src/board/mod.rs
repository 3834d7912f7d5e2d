//! Board abstraction consumed by the engine.
//!
//! The engine issues one logical action per axis; the board expands it to
//! the hardware: one or two physical drivers per axis (dual-X carriage,
//! dual-Z), direction and step-pin polarities, endstop line polarities,
//! and the step timer. [`GpioBoard`] implements the contract over
//! `embedded-hal` pins; [`SimBoard`] records everything for host tests.

mod gpio;
#[cfg(feature = "std")]
mod sim;

pub use gpio::{AxisSlot, EndstopPin, FanOutMode, GpioBoard, StepChannel, StepTimer};
#[cfg(feature = "std")]
pub use sim::SimBoard;

use crate::axis::{Axis, CarriageMode, EndstopSide};

/// Hardware services the step generator relies on.
///
/// All methods are called from the timer interrupt unless noted; they must
/// not block beyond the few-microsecond STEP pulse width.
pub trait StepperBoard {
    /// Latch the travel direction for an axis. Called once per block.
    fn set_dir(&mut self, axis: Axis, negative: bool);

    /// Emit one step pulse on an axis: assert STEP, hold the driver's
    /// minimum high time, deassert.
    fn pulse_step(&mut self, axis: Axis);

    /// Sample an endstop line. Returns `true` when the switch is
    /// triggered (polarity already normalized).
    fn read_endstop(&mut self, axis: Axis, side: EndstopSide) -> bool;

    /// Assert or release a driver's enable input.
    fn enable_driver(&mut self, axis: Axis, on: bool);

    /// Apply the tool routing for the coming block (active extruder and
    /// dual-carriage mode).
    fn select_tool(&mut self, extruder: u8, mode: CarriageMode);

    /// Program the step timer: CTC mode, /8 prescaler, initial compare
    /// 0x4000. Called from `init` (mainline).
    fn setup_timer(&mut self);

    /// Program the compare value for the next step interrupt, in 2 MHz
    /// timer counts. Called on every interrupt before returning.
    fn set_step_interval(&mut self, ticks: u16);

    /// Mask or unmask the step compare interrupt.
    fn set_step_interrupt(&mut self, on: bool);

    /// Globally enable interrupts. Called once from `init` (mainline).
    fn enable_interrupts(&mut self);

    /// Milliseconds since power-up, for the coarse tamper timer.
    fn millis(&mut self) -> u32;

    /// Drive the tamper beeper.
    fn set_beeper(&mut self, _on: bool) {}

    /// Open or close the extrusion solenoid valves for the selected tool.
    fn set_valves(&mut self, _open: bool) {}

    /// Program a driver's digipot current. Called from `init` (mainline).
    fn set_driver_current(&mut self, _driver: usize, _value: u8) {}

    /// Program a driver's MS1/MS2 microstep mode pins. Called from `init`
    /// (mainline).
    fn set_microstep_mode(&mut self, _driver: usize, _mode: u8) {}

    /// Read back a driver's (MS1, MS2) pin levels for diagnostics.
    fn read_microstep_pins(&mut self, _driver: usize) -> (bool, bool) {
        (false, false)
    }
}

/// MS1/MS2 levels for a microstep divisor on an A4988-style driver.
pub fn microstep_pins(mode: u8) -> (bool, bool) {
    match mode {
        1 => (false, false),
        2 => (true, false),
        4 => (false, true),
        _ => (true, true),
    }
}
