//! Endstop sampling: per-switch debounce, trip latches, and the coarse
//! tamper beeper.

use crate::axis::{Axis, EndstopSide, ENDSTOP_AXES};
use crate::board::StepperBoard;
use crate::config::EngineConfig;

/// Consecutive triggered samples required to declare a trip. Two samples
/// at >= 1 kHz interrupt cadence ride out mechanical switch bounce.
pub const ENDSTOP_DEBOUNCE_SAMPLES: u8 = 2;

/// Beeper hold time after a tamper event.
const TAMPER_SILENCE_MS: u32 = 150;

/// Per-endstop sampling state plus the latched trip results read by
/// mainline.
#[derive(Debug)]
pub(crate) struct EndstopMonitor {
    present: [[bool; 2]; ENDSTOP_AXES],
    consecutive: [[u8; 2]; ENDSTOP_AXES],
    pub(crate) check_axis: [bool; ENDSTOP_AXES],
    pub(crate) check_all: bool,
    pub(crate) hit: [bool; ENDSTOP_AXES],
    pub(crate) trigsteps: [i32; ENDSTOP_AXES],
    tamper_level: u8,
    tamper_since: Option<u32>,
}

impl EndstopMonitor {
    pub(crate) fn new(config: &EngineConfig) -> Self {
        let mut present = [[false; 2]; ENDSTOP_AXES];
        for axis in Axis::CARTESIAN {
            for side in [EndstopSide::Min, EndstopSide::Max] {
                present[axis.index()][side.index()] =
                    config.axes.axis(axis).endstop(side).present;
            }
        }
        Self {
            present,
            consecutive: [[0; 2]; ENDSTOP_AXES],
            check_axis: [false; ENDSTOP_AXES],
            check_all: false,
            hit: [false; ENDSTOP_AXES],
            trigsteps: [0; ENDSTOP_AXES],
            tamper_level: 0,
            tamper_since: None,
        }
    }

    /// Set the check flag for one axis, or for all axes plus the
    /// all-axes flag.
    pub(crate) fn enable(&mut self, check: bool, axis: Option<Axis>) {
        match axis {
            Some(Axis::E) => {}
            Some(axis) => self.check_axis[axis.index()] = check,
            None => {
                self.check_axis = [check; ENDSTOP_AXES];
                self.check_all = check;
            }
        }
    }

    /// Whether trips on this axis are honored this tick.
    #[inline]
    pub(crate) fn axis_checked(&self, axis: Axis) -> bool {
        self.check_axis[axis.index()] || self.check_all
    }

    #[inline]
    pub(crate) fn is_present(&self, axis: Axis, side: EndstopSide) -> bool {
        self.present[axis.index()][side.index()]
    }

    /// Feed one sample for the endstop facing the current travel
    /// direction. Returns `true` when the debounce declares a trip.
    pub(crate) fn sample(
        &mut self,
        axis: Axis,
        side: EndstopSide,
        triggered: bool,
        axis_has_steps: bool,
    ) -> bool {
        let count = &mut self.consecutive[axis.index()][side.index()];
        if triggered {
            *count = count.saturating_add(1);
        } else {
            *count = 0;
        }
        *count >= ENDSTOP_DEBOUNCE_SAMPLES && axis_has_steps
    }

    /// Latch a trip for mainline to report.
    pub(crate) fn latch(&mut self, axis: Axis, position: i32) {
        self.hit[axis.index()] = true;
        self.trigsteps[axis.index()] = position;
    }

    pub(crate) fn clear_hits(&mut self) {
        self.hit = [false; ENDSTOP_AXES];
    }

    /// Coarse tamper detector: a rising count of asserted endstop lines
    /// while no print is streaming fires the beeper, auto-silenced after
    /// 150 ms. Runs every interrupt, block or not.
    pub(crate) fn service_tamper<B: StepperBoard>(&mut self, board: &mut B, print_active: bool) {
        let mut level = 0u8;
        for axis in Axis::CARTESIAN {
            for side in [EndstopSide::Min, EndstopSide::Max] {
                if self.is_present(axis, side) && board.read_endstop(axis, side) {
                    level += 1;
                }
            }
        }

        let any_check = self.check_all || self.check_axis.iter().any(|c| *c);
        if level > self.tamper_level && !print_active && any_check {
            self.tamper_since = Some(board.millis());
            board.set_beeper(true);
        }
        if let Some(since) = self.tamper_since {
            if board.millis().wrapping_sub(since) > TAMPER_SILENCE_MS && !print_active {
                self.tamper_since = None;
                board.set_beeper(false);
            }
        }
        self.tamper_level = level;
    }
}
