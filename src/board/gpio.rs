//! Board implementation over `embedded-hal` 1.0 pins.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::axis::{Axis, CarriageMode, EndstopSide, AXIS_COUNT, ENDSTOP_AXES};
use crate::config::EngineConfig;

use super::StepperBoard;

/// Step timer owned by the board: a compare-match timer counting at
/// 2 MHz, plus the global interrupt gate and a millisecond clock.
pub trait StepTimer {
    /// Put the timer in CTC mode with the /8 prescaler and an initial
    /// compare of 0x4000.
    fn setup(&mut self);

    /// Program the compare register for the next interrupt.
    fn set_compare(&mut self, ticks: u16);

    /// Mask or unmask the compare interrupt.
    fn set_interrupt(&mut self, on: bool);

    /// Globally enable interrupts.
    fn enable_global(&mut self);

    /// Milliseconds since power-up.
    fn millis(&mut self) -> u32;
}

/// One physical driver channel: STEP and DIR outputs plus an optional
/// enable line.
pub struct StepChannel<STEP, DIR, EN> {
    step: STEP,
    dir: DIR,
    enable: Option<EN>,
    dir_invert: bool,
    step_idle_high: bool,
    pulse_width_us: u8,
    enable_active_low: bool,
}

impl<STEP, DIR, EN> StepChannel<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    /// Create a channel with default polarities (DIR direct, STEP idles
    /// low, enable active-low, no enforced pulse width).
    pub fn new(step: STEP, dir: DIR) -> Self {
        Self {
            step,
            dir,
            enable: None,
            dir_invert: false,
            step_idle_high: false,
            pulse_width_us: 0,
            enable_active_low: true,
        }
    }

    /// Attach the driver enable pin.
    pub fn enable_pin(mut self, pin: EN, active_low: bool) -> Self {
        self.enable = Some(pin);
        self.enable_active_low = active_low;
        self
    }

    /// Invert the DIR line.
    pub fn dir_invert(mut self, invert: bool) -> Self {
        self.dir_invert = invert;
        self
    }

    /// STEP line idles high (pulses are active-low).
    pub fn step_idle_high(mut self, idle_high: bool) -> Self {
        self.step_idle_high = idle_high;
        self
    }

    /// Enforce a minimum STEP-high width with a busy-wait. The extruder
    /// driver needs >= 2 µs; the cartesian axes normally ride on the
    /// interrupt overhead.
    pub fn pulse_width_us(mut self, us: u8) -> Self {
        self.pulse_width_us = us;
        self
    }

    /// Recover the pins.
    pub fn free(self) -> (STEP, DIR, Option<EN>) {
        (self.step, self.dir, self.enable)
    }

    fn write_dir(&mut self, negative: bool) {
        if negative != self.dir_invert {
            self.dir.set_high().ok();
        } else {
            self.dir.set_low().ok();
        }
    }

    /// Emit one step pulse.
    pub fn pulse(&mut self, delay: &mut impl DelayNs) {
        if self.step_idle_high {
            self.step.set_low().ok();
        } else {
            self.step.set_high().ok();
        }
        if self.pulse_width_us > 0 {
            delay.delay_us(self.pulse_width_us as u32);
        }
        if self.step_idle_high {
            self.step.set_high().ok();
        } else {
            self.step.set_low().ok();
        }
    }

    fn set_enabled(&mut self, on: bool) {
        if let Some(pin) = self.enable.as_mut() {
            if on != self.enable_active_low {
                pin.set_high().ok();
            } else {
                pin.set_low().ok();
            }
        }
    }
}

/// How a slot's channels share the logical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutMode {
    /// Every channel steps with the same direction.
    All,
    /// The second channel steps with inverted direction.
    Mirrored,
    /// Only the channel selected by the active tool steps.
    ToolSelect,
}

/// The fan-out descriptor for one logical axis: one or two driver
/// channels and the mode that routes pulses to them.
pub struct AxisSlot<STEP, DIR, EN> {
    channels: heapless::Vec<StepChannel<STEP, DIR, EN>, 2>,
    mode: FanOutMode,
    selected: usize,
}

impl<STEP, DIR, EN> AxisSlot<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    /// An axis driven by a single channel.
    pub fn single(channel: StepChannel<STEP, DIR, EN>) -> Self {
        let mut channels = heapless::Vec::new();
        let _ = channels.push(channel);
        Self {
            channels,
            mode: FanOutMode::All,
            selected: 0,
        }
    }

    /// An axis driven by two channels.
    pub fn dual(
        first: StepChannel<STEP, DIR, EN>,
        second: StepChannel<STEP, DIR, EN>,
        mode: FanOutMode,
    ) -> Self {
        let mut channels = heapless::Vec::new();
        let _ = channels.push(first);
        let _ = channels.push(second);
        Self {
            channels,
            mode,
            selected: 0,
        }
    }

    /// Swap the fan-out mode (dual-carriage mode change).
    pub fn set_mode(&mut self, mode: FanOutMode) {
        self.mode = mode;
    }

    fn select(&mut self, index: usize) {
        self.selected = index.min(self.channels.len().saturating_sub(1));
    }

    fn set_dir(&mut self, negative: bool) {
        let mode = self.mode;
        let selected = self.selected;
        for (i, channel) in self.channels.iter_mut().enumerate() {
            let active = match mode {
                FanOutMode::All | FanOutMode::Mirrored => true,
                FanOutMode::ToolSelect => i == selected,
            };
            if active {
                let mirrored = mode == FanOutMode::Mirrored && i == 1;
                channel.write_dir(negative != mirrored);
            }
        }
    }

    fn pulse(&mut self, delay: &mut impl DelayNs) {
        // Raise every active STEP line, hold once, drop them together.
        let mut width = 0u8;
        for (i, channel) in self.channels.iter_mut().enumerate() {
            if match self.mode {
                FanOutMode::All | FanOutMode::Mirrored => true,
                FanOutMode::ToolSelect => i == self.selected,
            } {
                width = width.max(channel.pulse_width_us);
                if channel.step_idle_high {
                    channel.step.set_low().ok();
                } else {
                    channel.step.set_high().ok();
                }
            }
        }
        if width > 0 {
            delay.delay_us(width as u32);
        }
        for (i, channel) in self.channels.iter_mut().enumerate() {
            if match self.mode {
                FanOutMode::All | FanOutMode::Mirrored => true,
                FanOutMode::ToolSelect => i == self.selected,
            } {
                if channel.step_idle_high {
                    channel.step.set_high().ok();
                } else {
                    channel.step.set_low().ok();
                }
            }
        }
    }

    fn set_enabled(&mut self, on: bool) {
        for channel in self.channels.iter_mut() {
            channel.set_enabled(on);
        }
    }
}

/// An endstop input with its polarity.
pub struct EndstopPin<ES> {
    pin: ES,
    invert: bool,
}

impl<ES: InputPin> EndstopPin<ES> {
    /// Wrap an input line; `invert` flips the triggered level.
    pub fn new(pin: ES, invert: bool) -> Self {
        Self { pin, invert }
    }

    fn triggered(&mut self) -> bool {
        self.pin.is_high().unwrap_or(false) != self.invert
    }
}

/// [`StepperBoard`] over `embedded-hal` pins and a [`StepTimer`].
///
/// Covers the motion surface (step/dir/enable channels, endstops, timer).
/// Boards with beepers, solenoid valves or SPI digipots wrap this type and
/// override the corresponding trait methods.
pub struct GpioBoard<STEP, DIR, EN, ES, D, T> {
    axes: [AxisSlot<STEP, DIR, EN>; AXIS_COUNT],
    endstops: [[Option<EndstopPin<ES>>; 2]; ENDSTOP_AXES],
    delay: D,
    timer: T,
}

impl<STEP, DIR, EN, ES, D, T> GpioBoard<STEP, DIR, EN, ES, D, T>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
    ES: InputPin,
    D: DelayNs,
    T: StepTimer,
{
    /// Assemble a board from its axis slots and endstop inputs
    /// (`endstops[axis][side]`, X/Y/Z by Min/Max).
    pub fn new(
        axes: [AxisSlot<STEP, DIR, EN>; AXIS_COUNT],
        endstops: [[Option<EndstopPin<ES>>; 2]; ENDSTOP_AXES],
        delay: D,
        timer: T,
    ) -> Self {
        Self {
            axes,
            endstops,
            delay,
            timer,
        }
    }

    /// Copy the configured polarities onto the pins: direction and
    /// step-idle inversion per axis, endstop inversion per switch.
    pub fn apply_config(&mut self, config: &EngineConfig) {
        for axis in Axis::ALL {
            let axis_cfg = config.axes.axis(axis);
            for channel in self.axes[axis.index()].channels.iter_mut() {
                channel.dir_invert = axis_cfg.invert_dir;
                channel.step_idle_high = axis_cfg.invert_step_pin;
                // The extruder driver needs its STEP high time held.
                if axis == Axis::E {
                    channel.pulse_width_us = channel.pulse_width_us.max(2);
                }
            }
        }
        for axis in Axis::CARTESIAN {
            for side in [EndstopSide::Min, EndstopSide::Max] {
                let es_cfg = config.axes.axis(axis).endstop(side);
                if let Some(endstop) = self.endstops[axis.index()][side.index()].as_mut() {
                    endstop.invert = es_cfg.invert;
                }
            }
        }
    }

    /// Access an axis slot, e.g. to swap its fan-out mode from mainline.
    pub fn axis_slot(&mut self, axis: Axis) -> &mut AxisSlot<STEP, DIR, EN> {
        &mut self.axes[axis.index()]
    }
}

impl<STEP, DIR, EN, ES, D, T> StepperBoard for GpioBoard<STEP, DIR, EN, ES, D, T>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
    ES: InputPin,
    D: DelayNs,
    T: StepTimer,
{
    fn set_dir(&mut self, axis: Axis, negative: bool) {
        self.axes[axis.index()].set_dir(negative);
    }

    fn pulse_step(&mut self, axis: Axis) {
        self.axes[axis.index()].pulse(&mut self.delay);
    }

    fn read_endstop(&mut self, axis: Axis, side: EndstopSide) -> bool {
        if axis == Axis::E {
            return false;
        }
        match self.endstops[axis.index()][side.index()].as_mut() {
            Some(endstop) => endstop.triggered(),
            None => false,
        }
    }

    fn enable_driver(&mut self, axis: Axis, on: bool) {
        self.axes[axis.index()].set_enabled(on);
    }

    fn select_tool(&mut self, extruder: u8, mode: CarriageMode) {
        let x = &mut self.axes[Axis::X.index()];
        if x.channels.len() > 1 {
            match mode {
                CarriageMode::Single => {
                    x.set_mode(FanOutMode::ToolSelect);
                    x.select(extruder as usize);
                }
                CarriageMode::Duplicate => x.set_mode(FanOutMode::All),
                CarriageMode::Mirror => x.set_mode(FanOutMode::Mirrored),
            }
        }
        let e = &mut self.axes[Axis::E.index()];
        if e.channels.len() > 1 {
            match mode {
                CarriageMode::Single => {
                    e.set_mode(FanOutMode::ToolSelect);
                    e.select(extruder as usize);
                }
                CarriageMode::Duplicate | CarriageMode::Mirror => e.set_mode(FanOutMode::All),
            }
        }
    }

    fn setup_timer(&mut self) {
        self.timer.setup();
    }

    fn set_step_interval(&mut self, ticks: u16) {
        self.timer.set_compare(ticks);
    }

    fn set_step_interrupt(&mut self, on: bool) {
        self.timer.set_interrupt(on);
    }

    fn enable_interrupts(&mut self) {
        self.timer.enable_global();
    }

    fn millis(&mut self) -> u32 {
        self.timer.millis()
    }
}
