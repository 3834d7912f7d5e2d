//! # stepdrive
//!
//! Interrupt-driven step pulse generation for four-axis motion
//! controllers (X, Y, Z + extruder).
//!
//! Given a queue of pre-planned motion blocks (trapezoidal speed
//! profiles in integer step counts), the engine emits precisely timed
//! STEP/DIR pulses from a timer-compare interrupt, distributes
//! subordinate axes with a Bresenham accumulator, watches end-stops with
//! debounce, and exposes live step-count positions to mainline.
//!
//! ## Features
//!
//! - **Integer-exact**: all rate and interval math is 16/24/32-bit fixed
//!   point; the interval tables are generated at compile time from the
//!   CPU frequency
//! - **Bounded interrupt load**: above 10 kHz the interrupt emits 2 or 4
//!   pulses per invocation, holding its frequency near 10 kHz
//! - **Configuration-driven**: pin polarities, endstop wiring, driver
//!   currents and dual-axis layout load from TOML (with `std`) or
//!   [`EngineConfig::default`]
//! - **embedded-hal 1.0**: the board layer uses `OutputPin`/`InputPin`
//!   for STEP/DIR/endstops and `DelayNs` for the pulse width
//! - **no_std compatible**: the engine itself never allocates
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepdrive::{BlockBuilder, BlockQueue, EngineConfig, StepperEngine};
//!
//! let config = stepdrive::load_config("machine.toml")?;
//! let mut engine = StepperEngine::new(&config);
//! let mut queue: BlockQueue<16> = BlockQueue::new();
//! engine.init(&mut board);
//!
//! queue.push(
//!     BlockBuilder::new([1600, 0, 0, 0])
//!         .nominal_rate(4000)
//!         .entry_rate(200)
//!         .exit_rate(200)
//!         .acceleration(8000)
//!         .build()?,
//! ).ok();
//!
//! // from the timer-compare interrupt:
//! engine.tick(&mut queue, &mut board);
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): TOML loading, the simulation board, host-test
//!   critical sections
//! - `defmt`: `defmt::Format` derives for embedded logging

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

// Core modules
pub mod axis;
pub mod board;
pub mod config;
pub mod error;
pub mod engine;
pub mod planner;
pub mod rate;
pub mod report;
pub mod sync;

// Re-exports for ergonomic API
pub use axis::{Axis, CarriageMode, DirectionBits, EndstopSide};
pub use board::{GpioBoard, StepperBoard};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use engine::{synchronize, StepperEngine, IDLE_INTERVAL};
pub use planner::{Block, BlockBuilder, BlockQueue, Planner};
pub use rate::{calc_timer, RateInterval, MAX_STEP_RATE, MIN_TIMER_COUNT, TIMER_HZ};
pub use sync::IsrCell;

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::load_config;

#[cfg(feature = "std")]
pub use board::SimBoard;
