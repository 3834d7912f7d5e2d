//! Trapezoid profile computation for block construction.
//!
//! The engine only consumes finished blocks; this builder does the
//! planner-side arithmetic that turns signed step deltas and rates into
//! the integer fields the interrupt path executes. Applications with a
//! full look-ahead planner will compute these fields themselves.

use libm::sqrtf;

use crate::axis::{Axis, CarriageMode, DirectionBits, AXIS_COUNT};
use crate::error::{BlockError, Result};
use crate::rate::TIMER_HZ;

use super::block::Block;

/// Builder for a single trapezoidal [`Block`].
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    deltas: [i32; AXIS_COUNT],
    nominal_rate: u32,
    acceleration: u32,
    entry_rate: u32,
    exit_rate: u32,
    active_extruder: u8,
    carriage_mode: CarriageMode,
}

impl BlockBuilder {
    /// Start a block from signed per-axis step deltas.
    pub fn new(deltas: [i32; AXIS_COUNT]) -> Self {
        Self {
            deltas,
            nominal_rate: 1000,
            acceleration: 0,
            entry_rate: 0,
            exit_rate: 0,
            active_extruder: 0,
            carriage_mode: CarriageMode::Single,
        }
    }

    /// Cruise rate of the dominant axis in steps/s.
    pub fn nominal_rate(mut self, rate: u32) -> Self {
        self.nominal_rate = rate;
        self
    }

    /// Acceleration in steps/s². Zero produces a constant-rate block.
    pub fn acceleration(mut self, accel: u32) -> Self {
        self.acceleration = accel;
        self
    }

    /// Entry rate in steps/s (clamped to the cruise rate).
    pub fn entry_rate(mut self, rate: u32) -> Self {
        self.entry_rate = rate;
        self
    }

    /// Exit rate in steps/s (clamped to the cruise rate).
    pub fn exit_rate(mut self, rate: u32) -> Self {
        self.exit_rate = rate;
        self
    }

    /// Tool routing carried in the block.
    pub fn tool(mut self, extruder: u8, mode: CarriageMode) -> Self {
        self.active_extruder = extruder;
        self.carriage_mode = mode;
        self
    }

    /// Compute the trapezoid and produce a validated block.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::Empty`] when no axis moves.
    pub fn build(self) -> Result<Block> {
        let mut steps = [0u32; AXIS_COUNT];
        let mut direction_bits = DirectionBits::empty();
        for axis in Axis::ALL {
            let delta = self.deltas[axis.index()];
            steps[axis.index()] = delta.unsigned_abs();
            if delta < 0 {
                direction_bits |= DirectionBits::of(axis);
            }
        }

        let step_event_count = *steps.iter().max().unwrap_or(&0);
        if step_event_count == 0 {
            return Err(BlockError::Empty.into());
        }

        let mut nominal_rate = self.nominal_rate.max(1);

        let block = if self.acceleration == 0 {
            // Constant cadence: entry and exit collapse onto the cruise rate.
            Block {
                steps,
                step_event_count,
                direction_bits,
                nominal_rate,
                initial_rate: nominal_rate,
                final_rate: nominal_rate,
                acceleration_rate: 0,
                accelerate_until: 0,
                decelerate_after: step_event_count,
                active_extruder: self.active_extruder,
                carriage_mode: self.carriage_mode,
                busy: false,
            }
        } else {
            let initial_rate = self.entry_rate.min(nominal_rate);
            let final_rate = self.exit_rate.min(nominal_rate);

            let accel = self.acceleration as f32;
            let total = step_event_count as f32;
            let entry = initial_rate as f32;
            let exit = final_rate as f32;
            let cruise = nominal_rate as f32;

            // Distance needed to ramp between two rates:
            // d = (v1^2 - v0^2) / (2a)
            let mut accel_steps = (cruise * cruise - entry * entry) / (2.0 * accel);
            let decel_steps = (cruise * cruise - exit * exit) / (2.0 * accel);

            let (accelerate_until, decelerate_after) =
                if accel_steps + decel_steps > total {
                    // Too short to reach the cruise rate: accelerate to the
                    // intersection of the ramps, then decelerate.
                    accel_steps =
                        (2.0 * accel * total + exit * exit - entry * entry) / (4.0 * accel);
                    accel_steps = accel_steps.clamp(0.0, total);
                    let peak = sqrtf(entry * entry + 2.0 * accel * accel_steps);
                    nominal_rate = (peak as u32)
                        .max(initial_rate)
                        .max(final_rate)
                        .max(1);
                    let until = accel_steps as u32;
                    (until, until)
                } else {
                    (
                        accel_steps as u32,
                        step_event_count - decel_steps as u32,
                    )
                };

            Block {
                steps,
                step_event_count,
                direction_bits,
                nominal_rate,
                initial_rate,
                final_rate,
                acceleration_rate: acceleration_rate_for(self.acceleration),
                accelerate_until,
                decelerate_after,
                active_extruder: self.active_extruder,
                carriage_mode: self.carriage_mode,
                busy: false,
            }
        };

        block.validate()?;
        Ok(block)
    }
}

/// Scale an acceleration in steps/s² into the 8.24 per-tick rate gain the
/// trapezoid scheduler applies: `accel * 2^24 / TIMER_HZ`.
pub fn acceleration_rate_for(accel_steps_per_s2: u32) -> u32 {
    (accel_steps_per_s2 as f32 * (1u64 << 24) as f32 / TIMER_HZ as f32) as u32
}
