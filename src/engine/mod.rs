//! The step generation engine: interrupt-side state machine plus the
//! mainline control surface.
//!
//! One [`StepperEngine`] exists per machine. Its [`tick`](StepperEngine::tick)
//! is the timer-compare interrupt body; everything else is mainline API
//! and must run with the interrupt masked, in practice inside the same
//! [`IsrCell`](crate::sync::IsrCell) critical section that hands the
//! engine to the interrupt.

mod endstop;
mod tick;

pub use endstop::ENDSTOP_DEBOUNCE_SAMPLES;

use core::fmt;

use crate::axis::{Axis, AXIS_COUNT};
use crate::board::StepperBoard;
use crate::config::EngineConfig;
use crate::error::BlockError;
use crate::planner::{Block, Planner};
use crate::report;

use endstop::EndstopMonitor;

/// Compare value programmed while no block is available (1 kHz park).
pub const IDLE_INTERVAL: u16 = 2000;

/// Delay before the first pulse of a block that late-enables Z (1 ms).
pub(crate) const LATE_Z_DELAY: u16 = 2000;

/// Inner iterations of E-axis idle before the solenoid valves release.
pub(crate) const VALVE_RELEASE_TICKS: u16 = 160;

/// Diagnostics latched by the interrupt path, reported by mainline.
#[derive(Debug, Default)]
struct Diagnostics {
    steprate_too_high: Option<u32>,
    bad_block: Option<BlockError>,
}

/// The step pulse engine.
pub struct StepperEngine {
    // Options and mechanics snapshotted from configuration.
    steps_per_unit: [f32; AXIS_COUNT],
    late_z_enable: bool,
    valve_coupling: bool,
    abort_on_endstop_hit: bool,
    endstops_only_for_homing: bool,
    digipot_currents: [u8; crate::axis::DRIVER_COUNT],
    microstep_modes: [u8; crate::axis::DRIVER_COUNT],

    // Interrupt-exclusive block execution state.
    pub(crate) current: Option<Block>,
    pub(crate) counter: [i32; AXIS_COUNT],
    pub(crate) step_events_completed: u32,
    pub(crate) acceleration_time: u32,
    pub(crate) deceleration_time: u32,
    pub(crate) acc_step_rate: u16,
    pub(crate) step_loops: u8,
    pub(crate) step_loops_nominal: u8,
    pub(crate) nominal_interval: u16,

    // Shared with mainline under the critical-section discipline.
    count_position: [i32; AXIS_COUNT],
    pub(crate) count_direction: [i8; AXIS_COUNT],
    pub(crate) endstops: EndstopMonitor,
    pub(crate) quick_stop: bool,
    pub(crate) print_active: bool,
    pub(crate) thermal_fault: bool,
    pub(crate) valve_idle_ticks: u16,
    diag: Diagnostics,
}

impl StepperEngine {
    /// Build an engine from configuration. Nothing touches the hardware
    /// until [`init`](Self::init).
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            steps_per_unit: config.axes.steps_per_unit(),
            late_z_enable: config.options.late_z_enable,
            valve_coupling: config.options.valve_coupling,
            abort_on_endstop_hit: config.options.abort_on_endstop_hit,
            endstops_only_for_homing: config.options.endstops_only_for_homing,
            digipot_currents: config.drivers.digipot_currents,
            microstep_modes: config.drivers.microstep_modes,
            current: None,
            counter: [0; AXIS_COUNT],
            step_events_completed: 0,
            acceleration_time: 0,
            deceleration_time: 0,
            acc_step_rate: 0,
            step_loops: 1,
            step_loops_nominal: 1,
            nominal_interval: IDLE_INTERVAL,
            count_position: [0; AXIS_COUNT],
            count_direction: [1; AXIS_COUNT],
            endstops: EndstopMonitor::new(config),
            quick_stop: false,
            print_active: false,
            thermal_fault: false,
            valve_idle_ticks: 0,
            diag: Diagnostics::default(),
        }
    }

    /// One-time hardware bring-up: timer in CTC mode with the /8
    /// prescaler, driver currents and microstep modes programmed, endstop
    /// policy applied, interrupts enabled.
    pub fn init<B: StepperBoard>(&mut self, board: &mut B) {
        board.setup_timer();
        for driver in 0..crate::axis::DRIVER_COUNT {
            board.set_driver_current(driver, self.digipot_currents[driver]);
            board.set_microstep_mode(driver, self.microstep_modes[driver]);
        }
        self.count_position = [0; AXIS_COUNT];
        self.enable_endstops(!self.endstops_only_for_homing, None);
        board.set_step_interrupt(true);
        board.enable_interrupts();
    }

    /// Unmask the step interrupt after a sleep.
    pub fn wake<B: StepperBoard>(&mut self, board: &mut B) {
        board.set_step_interrupt(true);
    }

    /// Overwrite the live position counters. Mainline only; the caller
    /// holds the critical section, making the four writes one atomic
    /// update with respect to the interrupt.
    pub fn set_position(&mut self, x: i32, y: i32, z: i32, e: i32) {
        self.count_position = [x, y, z, e];
    }

    /// Overwrite only the extruder position (filament moves, G92 E).
    pub fn set_e_position(&mut self, e: i32) {
        self.count_position[Axis::E.index()] = e;
    }

    /// Live step count for one axis.
    #[inline]
    pub fn position(&self, axis: Axis) -> i32 {
        self.count_position[axis.index()]
    }

    /// Live step counts for all axes.
    #[inline]
    pub fn positions(&self) -> [i32; AXIS_COUNT] {
        self.count_position
    }

    pub(crate) fn add_position(&mut self, axis: Axis, delta: i32) {
        self.count_position[axis.index()] += delta;
    }

    /// Whether a block is currently executing.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Release every driver's enable output after motion has stopped.
    pub fn finish_and_disable<B: StepperBoard>(&mut self, board: &mut B) {
        for axis in Axis::ALL {
            board.enable_driver(axis, false);
        }
    }

    /// Abandon the current block and every queued one without disabling
    /// the drivers. The interrupt body is suppressed while the queue
    /// drains; afterwards the timer keeps running at the idle rate.
    /// Idempotent.
    pub fn quick_stop<P: Planner, B: StepperBoard>(&mut self, planner: &mut P, board: &mut B) {
        self.quick_stop = true;
        board.set_step_interrupt(false);
        while planner.blocks_queued() {
            planner.discard_head();
        }
        self.current = None;
        board.set_step_interrupt(true);
        self.quick_stop = false;
    }

    /// Set the endstop check flag for one axis, or (with `None`) for all
    /// axes plus the all-axes flag.
    pub fn enable_endstops(&mut self, check: bool, axis: Option<Axis>) {
        self.endstops.enable(check, axis);
    }

    /// Whether trips on this axis are currently honored.
    pub fn endstop_enabled(&self, axis: Axis) -> bool {
        axis != Axis::E && self.endstops.axis_checked(axis)
    }

    /// Latched trip flag for an axis.
    pub fn endstop_hit(&self, axis: Axis) -> bool {
        axis != Axis::E && self.endstops.hit[axis.index()]
    }

    /// Position latched at the moment of a trip, if one is pending.
    pub fn endstop_trigger_position(&self, axis: Axis) -> Option<i32> {
        if self.endstop_hit(axis) {
            Some(self.endstops.trigsteps[axis.index()])
        } else {
            None
        }
    }

    /// Clear the trip latches without reporting (homing expects hits).
    pub fn endstops_hit_on_purpose(&mut self) {
        self.endstops.clear_hits();
    }

    /// Report latched endstop hits in millimetres over the serial sink
    /// and clear them. Returns `true` when the abort-on-endstop policy
    /// asks the caller to stop the print and quick-stop.
    pub fn check_hit_endstops<W: fmt::Write>(
        &mut self,
        out: &mut W,
    ) -> Result<bool, fmt::Error> {
        let any = self.endstops.hit.iter().any(|h| *h);
        if !any {
            return Ok(false);
        }
        report::endstops_hit(
            out,
            &self.endstops.hit,
            &self.endstops.trigsteps,
            &self.steps_per_unit,
        )?;
        self.endstops.clear_hits();
        Ok(self.abort_on_endstop_hit)
    }

    /// Emit and clear any diagnostics latched by the interrupt path.
    pub fn report_diagnostics<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        if let Some(rate) = self.diag.steprate_too_high.take() {
            report::steprate_too_high(out, rate)?;
        }
        if let Some(err) = self.diag.bad_block.take() {
            writeln!(out, "Bad block skipped: {}", err)?;
        }
        Ok(())
    }

    /// Dump the MS1/MS2 pin levels of all five drivers.
    pub fn microstep_readings<W: fmt::Write, B: StepperBoard>(
        &self,
        out: &mut W,
        board: &mut B,
    ) -> fmt::Result {
        report::microstep_pins(out, board)
    }

    /// Tell the tamper detector a print is streaming.
    pub fn set_print_active(&mut self, active: bool) {
        self.print_active = active;
    }

    /// Latch or clear the hotend thermal fault gating the valves.
    pub fn set_thermal_fault(&mut self, fault: bool) {
        self.thermal_fault = fault;
    }

    pub(crate) fn latch_steprate_diag(&mut self, rate: u32) {
        self.diag.steprate_too_high = Some(rate);
    }

    pub(crate) fn latch_block_diag(&mut self, err: BlockError) {
        self.diag.bad_block = Some(err);
    }

    pub(crate) fn late_z_enable(&self) -> bool {
        self.late_z_enable
    }

    pub(crate) fn valve_coupling(&self) -> bool {
        self.valve_coupling
    }
}

/// Block in mainline until the planner drains, servicing housekeeping
/// between polls.
///
/// `queued` must poll the planner from inside the critical section;
/// `housekeeping` runs outside it (heaters, inactivity, UI).
pub fn synchronize(mut queued: impl FnMut() -> bool, mut housekeeping: impl FnMut()) {
    while queued() {
        housekeeping();
    }
}
