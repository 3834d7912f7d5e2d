//! Integration tests for the step pulse engine.
//!
//! These drive the full interrupt path (block pump, Bresenham
//! distribution, trapezoid scheduling, endstop monitoring) through the
//! simulation board and a block queue.

use stepdrive::axis::{Axis, EndstopSide};
use stepdrive::engine::synchronize;
use stepdrive::{
    Block, BlockBuilder, BlockQueue, EngineConfig, IsrCell, Planner, SimBoard, StepperBoard,
    StepperEngine, IDLE_INTERVAL, TIMER_HZ,
};

// =============================================================================
// Harness
// =============================================================================

fn engine() -> StepperEngine {
    StepperEngine::new(&EngineConfig::default())
}

fn cruise_block(deltas: [i32; 4], rate: u32) -> Block {
    BlockBuilder::new(deltas)
        .nominal_rate(rate)
        .build()
        .expect("cruise block")
}

/// Tick until the queue drains and the engine idles. Returns the number
/// of interrupts taken while a block was active.
fn run_to_idle(
    engine: &mut StepperEngine,
    queue: &mut BlockQueue<8>,
    board: &mut SimBoard,
    max_ticks: usize,
) -> usize {
    let mut ticks = 0;
    while engine.is_active() || queue.blocks_queued() {
        engine.tick(queue, board);
        ticks += 1;
        assert!(ticks <= max_ticks, "engine failed to finish in {} ticks", max_ticks);
    }
    ticks
}

// =============================================================================
// S1: pure X cruise, 100 steps at 4000 Hz
// =============================================================================

#[test]
fn s1_cruise_only_block_is_constant_cadence() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    queue.push(cruise_block([100, 0, 0, 0], 4000)).unwrap();
    let ticks = run_to_idle(&mut engine, &mut queue, &mut board, 200);

    assert_eq!(ticks, 100);
    assert_eq!(board.pulses, [100, 0, 0, 0]);
    assert_eq!(engine.positions(), [100, 0, 0, 0]);

    // Every programmed interval equals 2 MHz / 4 kHz = 500 counts; total
    // wall time 100 * 500 counts = 25 ms.
    let expected = (TIMER_HZ / 4000) as u16;
    assert!(board.intervals.iter().all(|&i| i == expected));
    let wall_ticks: u32 = 100 * expected as u32;
    assert_eq!(wall_ticks, 50_000);
}

// =============================================================================
// S2: diagonal XY, 3:4 triangle
// =============================================================================

#[test]
fn s2_bresenham_interleaves_subordinate_axis() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    queue.push(cruise_block([30, 40, 0, 0], 1000)).unwrap();
    let ticks = run_to_idle(&mut engine, &mut queue, &mut board, 100);

    assert_eq!(ticks, 40);
    assert_eq!(board.pulses, [30, 40, 0, 0]);
    assert_eq!(engine.positions(), [30, 40, 0, 0]);

    // The dominant axis pulses every tick; X never pulses twice between
    // Y pulses.
    let mut x_run = 0;
    for axis in &board.pulse_order {
        match axis {
            Axis::X => {
                x_run += 1;
                assert!(x_run <= 1, "X pulsed twice within one Y period");
            }
            Axis::Y => x_run = 0,
            _ => panic!("unexpected axis pulsed"),
        }
    }
}

// =============================================================================
// S3: full trapezoid
// =============================================================================

#[test]
fn s3_trapezoid_rate_is_monotonic_per_phase() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    let block = BlockBuilder::new([500, 0, 0, 0])
        .nominal_rate(2000)
        .entry_rate(200)
        .exit_rate(200)
        .acceleration(19_800)
        .build()
        .unwrap();
    assert_eq!(block.accelerate_until, 100);
    assert_eq!(block.decelerate_after, 400);
    queue.push(block).unwrap();

    run_to_idle(&mut engine, &mut queue, &mut board, 1000);
    assert_eq!(board.pulses, [500, 0, 0, 0]);

    // Skip the transient block-load write; one scheduling write per tick
    // remains.
    let sched = &board.intervals[1..];
    let cruise = (TIMER_HZ / 2000) as u16;
    let entry = (TIMER_HZ / 200) as u16;

    // The block-load transient programs the entry rate.
    assert_eq!(board.intervals[0], entry);
    let first_cruise = sched.iter().position(|&i| i == cruise).expect("reached cruise");
    let last_cruise = sched.len() - 1
        - sched.iter().rev().position(|&i| i == cruise).unwrap();

    // Accelerating: intervals never rise.
    for pair in sched[..=first_cruise].windows(2) {
        assert!(pair[1] <= pair[0], "interval rose during acceleration");
    }
    // Decelerating: intervals never fall.
    for pair in sched[last_cruise..].windows(2) {
        assert!(pair[1] >= pair[0], "interval fell during deceleration");
    }
    // Exit rate comes back near the entry rate.
    let last = *sched.last().unwrap();
    assert!(last <= entry && last > cruise);
}

// =============================================================================
// S4: endstop trip during homing
// =============================================================================

#[test]
fn s4_endstop_trip_latches_and_truncates_block() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    engine.enable_endstops(true, Some(Axis::X));
    queue.push(cruise_block([-1000, 0, 0, 0], 1000)).unwrap();

    let mut ticks = 0;
    while engine.is_active() || queue.blocks_queued() {
        engine.tick(&mut queue, &mut board);
        if engine.position(Axis::X) <= -137 {
            board.set_endstop(Axis::X, EndstopSide::Min, true);
        }
        ticks += 1;
        assert!(ticks < 1000, "block was not truncated");
    }

    // First triggered sample arms the debounce, the second trips: the
    // position latched is the one before the trip tick's pulse.
    assert!(engine.endstop_hit(Axis::X));
    assert_eq!(engine.endstop_trigger_position(Axis::X), Some(-138));
    assert_eq!(board.pulses[Axis::X.index()], 139);
    assert_eq!(engine.position(Axis::X), -139);
    assert!(!queue.blocks_queued());
}

#[test]
fn s4_trip_does_not_disturb_following_blocks() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    engine.enable_endstops(true, Some(Axis::X));
    board.set_endstop(Axis::X, EndstopSide::Min, true);
    queue.push(cruise_block([-500, 0, 0, 0], 1000)).unwrap();
    queue.push(cruise_block([0, 50, 0, 0], 1000)).unwrap();

    run_to_idle(&mut engine, &mut queue, &mut board, 200);

    // The X block died almost immediately; the Y block ran in full.
    assert!(board.pulses[Axis::X.index()] < 5);
    assert_eq!(board.pulses[Axis::Y.index()], 50);
}

#[test]
fn endstop_hits_are_reported_in_millimetres_and_cleared() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    engine.enable_endstops(true, Some(Axis::X));
    board.set_endstop(Axis::X, EndstopSide::Min, true);
    queue.push(cruise_block([-500, 0, 0, 0], 1000)).unwrap();
    run_to_idle(&mut engine, &mut queue, &mut board, 200);
    assert!(engine.endstop_hit(Axis::X));

    let mut out = String::new();
    let abort = engine.check_hit_endstops(&mut out).unwrap();
    assert!(!abort, "abort policy is off by default");
    assert!(out.starts_with("echo: endstops hit: X:"), "got: {}", out);
    assert!(!engine.endstop_hit(Axis::X));

    // Second call reports nothing.
    let mut out = String::new();
    engine.check_hit_endstops(&mut out).unwrap();
    assert!(out.is_empty());
}

#[test]
fn disabled_endstops_are_ignored() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    // Default policy: checks off until homing enables them.
    board.set_endstop(Axis::X, EndstopSide::Min, true);
    queue.push(cruise_block([-100, 0, 0, 0], 1000)).unwrap();
    run_to_idle(&mut engine, &mut queue, &mut board, 200);

    assert!(!engine.endstop_hit(Axis::X));
    assert_eq!(board.pulses[Axis::X.index()], 100);
}

#[test]
fn endstop_enable_round_trip_restores_state() {
    let mut engine = engine();

    assert!(!engine.endstop_enabled(Axis::Y));
    engine.enable_endstops(true, Some(Axis::Y));
    assert!(engine.endstop_enabled(Axis::Y));
    engine.enable_endstops(false, Some(Axis::Y));
    assert!(!engine.endstop_enabled(Axis::Y));

    engine.enable_endstops(true, None);
    assert!(engine.endstop_enabled(Axis::X));
    assert!(engine.endstop_enabled(Axis::Z));
    engine.enable_endstops(false, None);
    assert!(!engine.endstop_enabled(Axis::X));
}

// =============================================================================
// S5: quick-stop with queued blocks
// =============================================================================

#[test]
fn s5_quick_stop_abandons_all_motion() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    queue.push(cruise_block([1000, 0, 0, 0], 1000)).unwrap();
    queue.push(cruise_block([0, 100, 0, 0], 1000)).unwrap();
    queue.push(cruise_block([0, 0, 10, 0], 1000)).unwrap();

    for _ in 0..10 {
        engine.tick(&mut queue, &mut board);
    }
    let frozen = engine.positions();
    assert!(engine.is_active());

    engine.quick_stop(&mut queue, &mut board);

    assert!(!engine.is_active());
    assert!(!queue.blocks_queued());
    assert_eq!(engine.positions(), frozen);
    assert!(board.step_interrupt, "interrupt is re-enabled after the drain");

    // The timer keeps running at the idle rate.
    engine.tick(&mut queue, &mut board);
    assert_eq!(board.last_interval(), Some(IDLE_INTERVAL));

    // Idempotent.
    engine.quick_stop(&mut queue, &mut board);
    assert!(!engine.is_active());
    assert!(!queue.blocks_queued());
    assert_eq!(engine.positions(), frozen);
}

// =============================================================================
// S6: high-rate loop folding
// =============================================================================

#[test]
fn s6_high_rate_blocks_fold_pulses_into_fewer_interrupts() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    queue.push(cruise_block([320, 0, 0, 0], 32_000)).unwrap();
    let ticks = run_to_idle(&mut engine, &mut queue, &mut board, 200);

    // 4 pulses per interrupt at 8 kHz.
    assert_eq!(ticks, 80);
    assert_eq!(board.pulses, [320, 0, 0, 0]);
    let expected = (TIMER_HZ / 8000) as u16;
    assert!(board.intervals.iter().all(|&i| i == expected));
}

// =============================================================================
// Boundary behaviors
// =============================================================================

#[test]
fn single_step_block_emits_exactly_one_pulse() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    queue.push(cruise_block([1, 0, 0, 0], 1000)).unwrap();
    let ticks = run_to_idle(&mut engine, &mut queue, &mut board, 10);

    assert_eq!(ticks, 1);
    assert_eq!(board.pulses, [1, 0, 0, 0]);
}

#[test]
fn immediate_deceleration_block_slows_from_the_first_tick() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    let block = Block {
        steps: [50, 0, 0, 0],
        step_event_count: 50,
        nominal_rate: 2000,
        initial_rate: 2000,
        final_rate: 200,
        acceleration_rate: stepdrive::planner::acceleration_rate_for(19_800),
        accelerate_until: 0,
        decelerate_after: 0,
        ..Block::default()
    };
    assert!(block.validate().is_ok());
    queue.push(block).unwrap();

    run_to_idle(&mut engine, &mut queue, &mut board, 200);
    assert_eq!(board.pulses[Axis::X.index()], 50);

    // Past the load transient, intervals only grow.
    let sched = &board.intervals[1..];
    for pair in sched.windows(2) {
        assert!(pair[1] >= pair[0], "interval fell while decelerating");
    }
}

#[test]
fn idle_engine_parks_timer_at_one_kilohertz() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    engine.tick(&mut queue, &mut board);
    engine.tick(&mut queue, &mut board);

    assert_eq!(board.intervals, vec![IDLE_INTERVAL, IDLE_INTERVAL]);
    assert_eq!(board.pulses, [0, 0, 0, 0]);
}

#[test]
fn set_position_round_trips_while_idle() {
    let mut engine = engine();

    engine.set_position(100, -200, 42, 7);
    assert_eq!(engine.position(Axis::X), 100);
    assert_eq!(engine.position(Axis::Y), -200);
    assert_eq!(engine.position(Axis::Z), 42);
    assert_eq!(engine.position(Axis::E), 7);

    engine.set_e_position(-3);
    assert_eq!(engine.position(Axis::E), -3);
    assert_eq!(engine.position(Axis::X), 100);
}

#[test]
fn head_block_stays_busy_for_the_whole_execution() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    queue.push(cruise_block([20, 0, 0, 0], 1000)).unwrap();
    engine.tick(&mut queue, &mut board);

    while engine.is_active() {
        assert!(queue.head_block().unwrap().busy);
        engine.tick(&mut queue, &mut board);
    }
    assert!(!queue.blocks_queued());
}

#[test]
fn direction_pins_are_written_once_per_block() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    queue.push(cruise_block([-40, 40, 0, 0], 1000)).unwrap();
    run_to_idle(&mut engine, &mut queue, &mut board, 100);

    // One write per axis at block start, none mid-block.
    assert_eq!(board.dir_writes, 4);
    assert!(board.dir_negative[Axis::X.index()]);
    assert!(!board.dir_negative[Axis::Y.index()]);

    queue.push(cruise_block([40, 0, 0, 0], 1000)).unwrap();
    run_to_idle(&mut engine, &mut queue, &mut board, 100);
    assert_eq!(board.dir_writes, 8);
    assert!(!board.dir_negative[Axis::X.index()]);
}

// =============================================================================
// Late Z enable
// =============================================================================

#[test]
fn late_z_enable_delays_the_first_pulse() {
    let mut config = EngineConfig::default();
    config.options.late_z_enable = true;
    let mut engine = StepperEngine::new(&config);
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    queue.push(cruise_block([0, 0, 10, 0], 1000)).unwrap();

    engine.tick(&mut queue, &mut board);
    assert!(board.driver_enabled[Axis::Z.index()]);
    assert_eq!(board.pulses[Axis::Z.index()], 0, "no pulses during the 1 ms wait");
    assert_eq!(board.last_interval(), Some(2000));

    run_to_idle(&mut engine, &mut queue, &mut board, 100);
    assert_eq!(board.pulses[Axis::Z.index()], 10);
}

// =============================================================================
// Solenoid valve coupling
// =============================================================================

fn valve_engine() -> StepperEngine {
    let mut config = EngineConfig::default();
    config.options.valve_coupling = true;
    StepperEngine::new(&config)
}

#[test]
fn valves_open_while_extruding_forward() {
    let mut engine = valve_engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    queue.push(cruise_block([0, 0, 0, 50], 1000)).unwrap();
    for _ in 0..10 {
        engine.tick(&mut queue, &mut board);
    }
    assert!(board.valves_open);
}

#[test]
fn valves_stay_shut_on_retract_and_thermal_fault() {
    let mut engine = valve_engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    queue.push(cruise_block([0, 0, 0, -50], 1000)).unwrap();
    run_to_idle(&mut engine, &mut queue, &mut board, 100);
    assert!(!board.valves_open);

    engine.set_thermal_fault(true);
    queue.push(cruise_block([0, 0, 0, 50], 1000)).unwrap();
    run_to_idle(&mut engine, &mut queue, &mut board, 100);
    assert!(!board.valves_open);
}

#[test]
fn valves_release_after_extruder_idles() {
    let mut engine = valve_engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    // Prime the valves with forward extrusion.
    queue.push(cruise_block([0, 0, 0, 20], 1000)).unwrap();
    run_to_idle(&mut engine, &mut queue, &mut board, 100);
    assert!(board.valves_open);

    // A long travel move without E releases them after 160 idle
    // iterations.
    queue.push(cruise_block([200, 0, 0, 0], 1000)).unwrap();
    run_to_idle(&mut engine, &mut queue, &mut board, 400);
    assert!(!board.valves_open);
}

// =============================================================================
// Tamper beeper
// =============================================================================

#[test]
fn tamper_beeper_fires_and_auto_silences() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    engine.enable_endstops(true, None);
    engine.tick(&mut queue, &mut board);
    assert!(!board.beeper);

    board.set_endstop(Axis::Y, EndstopSide::Min, true);
    engine.tick(&mut queue, &mut board);
    assert!(board.beeper, "newly asserted endstop beeps");

    board.advance_ms(200);
    engine.tick(&mut queue, &mut board);
    assert!(!board.beeper, "beeper auto-silences after 150 ms");
}

#[test]
fn tamper_beeper_is_quiet_while_printing() {
    let mut engine = engine();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let mut board = SimBoard::new();

    engine.enable_endstops(true, None);
    engine.set_print_active(true);
    board.set_endstop(Axis::Y, EndstopSide::Min, true);
    engine.tick(&mut queue, &mut board);
    assert!(!board.beeper);
}

// =============================================================================
// Initialization and diagnostics
// =============================================================================

#[test]
fn init_programs_timer_drivers_and_policy() {
    let mut engine = engine();
    let mut board = SimBoard::new();

    engine.init(&mut board);

    assert!(board.timer_configured);
    assert!(board.step_interrupt);
    assert!(board.interrupts_enabled);
    assert_eq!(board.currents, [Some(135); 5]);
    assert_eq!(board.microstep_modes, [Some(16); 5]);
    // Default policy keeps endstops for homing only.
    assert!(!engine.endstop_enabled(Axis::X));
}

#[test]
fn microstep_readings_dump_five_drivers() {
    let engine = engine();
    let mut board = SimBoard::new();
    board.set_microstep_mode(0, 16);
    board.set_microstep_mode(1, 2);

    let mut out = String::new();
    engine.microstep_readings(&mut out, &mut board).unwrap();

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "MS1,MS2 Pins");
    assert_eq!(lines[1], "X: 1 1");
    assert_eq!(lines[2], "Y: 1 0");
    assert_eq!(lines.len(), 6);
}

#[test]
fn fresh_engine_reports_no_diagnostics() {
    let mut engine = engine();
    let mut out = String::new();
    engine.report_diagnostics(&mut out).unwrap();
    assert!(out.is_empty());
}

// =============================================================================
// Mainline synchronization and the ISR handoff
// =============================================================================

#[test]
fn synchronize_services_housekeeping_until_drained() {
    let mut remaining = 3;
    let mut serviced = 0;

    synchronize(
        || {
            let queued = remaining > 0;
            remaining -= i32::from(queued);
            queued
        },
        || serviced += 1,
    );

    assert_eq!(serviced, 3);
}

#[test]
fn isr_cell_hands_the_machine_between_contexts() {
    struct Machine {
        engine: StepperEngine,
        queue: BlockQueue<8>,
        board: SimBoard,
    }

    let machine = IsrCell::new(Machine {
        engine: StepperEngine::new(&EngineConfig::default()),
        queue: BlockQueue::new(),
        board: SimBoard::new(),
    });

    // Mainline queues a move...
    machine.with(|m| {
        m.queue.push(cruise_block([10, 0, 0, 0], 1000)).unwrap();
    });

    // ...the "interrupt" executes it.
    for _ in 0..10 {
        machine.with(|m| m.engine.tick(&mut m.queue, &mut m.board));
    }

    machine.with(|m| {
        assert_eq!(m.engine.position(Axis::X), 10);
        assert!(!m.queue.blocks_queued());
    });
}
