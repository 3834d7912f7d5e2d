//! Interrupt/mainline handoff.
//!
//! One machine, one hardware timer, one set of pins: the engine, planner
//! and board live together in a single [`IsrCell`]. The timer interrupt
//! borrows the cell to run [`tick`](crate::StepperEngine::tick); mainline
//! borrows it for the control API. `critical-section` guarantees the two
//! never overlap, which is the entire shared-state discipline. The
//! interrupt-enable flag is saved and restored by the critical-section
//! implementation for the target.

use core::cell::RefCell;

use critical_section::Mutex;

/// An interrupt-safe cell for state shared between the timer ISR and
/// mainline.
///
/// ```ignore
/// static MACHINE: IsrCell<Machine> = IsrCell::new(Machine::new());
///
/// // in the timer ISR:
/// MACHINE.with(|m| m.engine.tick(&mut m.planner, &mut m.board));
///
/// // in mainline:
/// MACHINE.with(|m| m.engine.set_position(0, 0, 0, 0));
/// ```
pub struct IsrCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> IsrCell<T> {
    /// Wrap a value for cross-context sharing.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access, interrupts masked.
    ///
    /// Keep the closure short: the step interrupt is pended, not lost,
    /// but long sections distort pulse timing.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_round_trip() {
        let cell = IsrCell::new(0u32);
        cell.with(|v| *v = 42);
        assert_eq!(cell.with(|v| *v), 42);
    }
}
