//! The interrupt body: block pump, endstop sampling, Bresenham
//! distribution and the trapezoid scheduler.

use crate::axis::{Axis, EndstopSide, AXIS_COUNT};
use crate::board::StepperBoard;
use crate::planner::{Block, Planner};
use crate::rate::{calc_timer, mul_u24_u24_shr24};

use super::{StepperEngine, IDLE_INTERVAL, LATE_Z_DELAY, VALVE_RELEASE_TICKS};

impl StepperEngine {
    /// Run one timer-compare interrupt.
    ///
    /// Pops a block from the planner when idle, distributes step pulses
    /// for this tick, samples endstops, advances the trapezoid and
    /// programs the compare register for the next interrupt. Never
    /// blocks beyond the STEP pulse width.
    pub fn tick<P: Planner, B: StepperBoard>(&mut self, planner: &mut P, board: &mut B) {
        if self.quick_stop {
            return;
        }

        let print_active = self.print_active;
        self.endstops.service_tamper(board, print_active);

        if self.current.is_none() && !self.pump_block(planner, board) {
            return;
        }

        let block = match self.current {
            Some(block) => block,
            None => return,
        };

        self.sample_endstops(&block, board);
        self.distribute_steps(&block, board);
        self.schedule_next(&block, board);

        if self.step_events_completed >= block.step_event_count {
            self.current = None;
            planner.discard_head();
        }
    }

    /// Pull the next block from the planner. Returns `false` when this
    /// interrupt should end immediately (nothing queued, bad block, or
    /// the late-Z start delay).
    fn pump_block<P: Planner, B: StepperBoard>(&mut self, planner: &mut P, board: &mut B) -> bool {
        let block = match planner.head_block() {
            Some(head) => {
                head.busy = true;
                *head
            }
            None => {
                board.set_step_interval(IDLE_INTERVAL);
                return false;
            }
        };

        if let Err(err) = block.validate() {
            debug_assert!(false, "planner produced an invalid block: {}", err);
            self.latch_block_diag(err);
            planner.discard_head();
            board.set_step_interval(IDLE_INTERVAL);
            return false;
        }

        self.begin_block(&block, board);
        let delay_start = self.late_z_enable() && block.steps_for(Axis::Z) > 0;
        self.current = Some(block);

        if delay_start {
            board.enable_driver(Axis::Z, true);
            board.set_step_interval(LATE_Z_DELAY);
            return false;
        }
        true
    }

    /// Reset the trapezoid and Bresenham state for a fresh block and
    /// latch its directions. Pins are written once here, never
    /// mid-block.
    fn begin_block<B: StepperBoard>(&mut self, block: &Block, board: &mut B) {
        self.deceleration_time = 0;
        let nominal = calc_timer(block.nominal_rate);
        self.nominal_interval = nominal.interval;
        self.step_loops_nominal = nominal.step_loops;
        if nominal.underflow {
            self.latch_steprate_diag(block.nominal_rate);
        }

        self.acc_step_rate = block.initial_rate.min(u16::MAX as u32) as u16;
        let first = calc_timer(block.initial_rate);
        self.acceleration_time = first.interval as u32;
        self.step_loops = first.step_loops;
        board.set_step_interval(first.interval);

        let half = -((block.step_event_count >> 1) as i32);
        self.counter = [half; AXIS_COUNT];
        self.step_events_completed = 0;

        board.select_tool(block.active_extruder, block.carriage_mode);
        for axis in Axis::ALL {
            let negative = block.direction_bits.is_negative(axis);
            board.set_dir(axis, negative);
            self.count_direction[axis.index()] = if negative { -1 } else { 1 };
        }
    }

    /// Sample the endstop facing each axis's travel direction. A trip
    /// needs two consecutive triggered reads and a non-zero step count;
    /// it latches the position and truncates the block.
    fn sample_endstops<B: StepperBoard>(&mut self, block: &Block, board: &mut B) {
        for axis in Axis::CARTESIAN {
            let side = if block.direction_bits.is_negative(axis) {
                EndstopSide::Min
            } else {
                EndstopSide::Max
            };
            if !self.endstops.axis_checked(axis) || !self.endstops.is_present(axis, side) {
                continue;
            }
            let triggered = board.read_endstop(axis, side);
            let has_steps = block.steps_for(axis) > 0;
            if self.endstops.sample(axis, side, triggered, has_steps) {
                let position = self.position(axis);
                self.endstops.latch(axis, position);
                self.step_events_completed = block.step_event_count;
            }
        }
    }

    /// The inner pulse loop: `step_loops` Bresenham iterations.
    fn distribute_steps<B: StepperBoard>(&mut self, block: &Block, board: &mut B) {
        for _ in 0..self.step_loops {
            let mut e_stepped = false;
            let mut other_stepped = false;

            for axis in Axis::ALL {
                let i = axis.index();
                self.counter[i] += block.steps[i] as i32;
                if self.counter[i] > 0 {
                    board.pulse_step(axis);
                    self.counter[i] -= block.step_event_count as i32;
                    self.add_position(axis, self.count_direction[i] as i32);
                    if axis == Axis::E {
                        e_stepped = true;
                    } else {
                        other_stepped = true;
                    }
                }
            }

            self.step_events_completed += 1;

            if self.valve_coupling() {
                self.update_valves(board, e_stepped, other_stepped);
            }

            if self.step_events_completed >= block.step_event_count {
                break;
            }
        }
    }

    /// Advance the trapezoid and program the next compare value.
    fn schedule_next<B: StepperBoard>(&mut self, block: &Block, board: &mut B) {
        if self.step_events_completed <= block.accelerate_until {
            let gain = mul_u24_u24_shr24(self.acceleration_time, block.acceleration_rate);
            let mut rate = block.initial_rate + gain as u32;
            if rate > block.nominal_rate {
                rate = block.nominal_rate;
            }
            let next = calc_timer(rate);
            board.set_step_interval(next.interval);
            self.acceleration_time += next.interval as u32;
            self.step_loops = next.step_loops;
            self.acc_step_rate = rate.min(u16::MAX as u32) as u16;
            if next.underflow {
                self.latch_steprate_diag(rate);
            }
        } else if self.step_events_completed > block.decelerate_after {
            let drop = mul_u24_u24_shr24(self.deceleration_time, block.acceleration_rate) as u32;
            let mut rate = if drop > self.acc_step_rate as u32 {
                block.final_rate
            } else {
                self.acc_step_rate as u32 - drop
            };
            if rate < block.final_rate {
                rate = block.final_rate;
            }
            let next = calc_timer(rate);
            board.set_step_interval(next.interval);
            self.deceleration_time += next.interval as u32;
            self.step_loops = next.step_loops;
            if next.underflow {
                self.latch_steprate_diag(rate);
            }
        } else {
            board.set_step_interval(self.nominal_interval);
            self.step_loops = self.step_loops_nominal;
        }
    }

    /// Solenoid valve coupling: valves follow forward E motion, release
    /// after [`VALVE_RELEASE_TICKS`] iterations of E idle while other
    /// axes move, and stay shut under a thermal fault.
    fn update_valves<B: StepperBoard>(
        &mut self,
        board: &mut B,
        e_stepped: bool,
        other_stepped: bool,
    ) {
        if e_stepped {
            self.valve_idle_ticks = 0;
        }
        if e_stepped || (!other_stepped && self.valve_idle_ticks <= VALVE_RELEASE_TICKS) {
            let open =
                self.count_direction[Axis::E.index()] > 0 && !self.thermal_fault;
            board.set_valves(open);
        } else if other_stepped {
            self.valve_idle_ticks += 1;
            if self.valve_idle_ticks > VALVE_RELEASE_TICKS {
                board.set_valves(false);
                self.valve_idle_ticks = 0;
            }
        }
    }
}
