//! Scheduler scenarios
//!
//! End-to-end tests driving a sequencer against simulated servos: the
//! parallel-batch-then-wait drain, goto loops with counters, the locking
//! policy, state transitions, and tick idempotency.

use std::sync::Arc;

use chrono::{Duration, Utc};
use seq_actuator::{ExtendedGroups, ServoActuator, ServoRegistry, SimActionGroups, SimServo};
use seq_core::{Command, CommandKind, ServoUid};
use seq_engine::{Environment, Sequencer};

struct Rig {
    sequencer: Sequencer,
    servos: Vec<Arc<SimServo>>,
}

fn rig() -> Rig {
    let registry = Arc::new(ServoRegistry::new());
    let mut servos = Vec::new();
    for uid in 1..=2u32 {
        let servo = Arc::new(SimServo::new(
            ServoUid(uid),
            format!("servo-{uid}"),
            0.0,
            100.0,
            10.0,
        ));
        servo.set_position(0.0);
        registry.register(servo.clone());
        servos.push(servo);
    }
    let sequencer = Sequencer::new(
        registry,
        Arc::new(SimActionGroups::new()),
        Arc::new(ExtendedGroups::absent()),
        Environment::Flight,
    );
    Rig { sequencer, servos }
}

fn advance_all(rig: &Rig, dt: f32) {
    for servo in &rig.servos {
        servo.advance(dt);
    }
}

fn goto_counter(cmd: &Command) -> i32 {
    match cmd.kind {
        CommandKind::Goto { counter, .. } => counter,
        _ => panic!("expected a goto command"),
    }
}

#[test]
fn parallel_batch_then_wait_drains_to_finished() {
    let mut rig = rig();
    let now = Utc::now();

    let id = rig.sequencer.create_sequence("batch");
    {
        let sq = rig.sequencer.sequence_mut(id).unwrap();
        sq.commands = vec![
            Command::move_servo(ServoUid(1), 10.0, 1.0),
            Command::move_servo(ServoUid(2), 5.0, 1.0),
            Command::wait_for_moves(),
        ];
    }

    rig.sequencer.start_sequence(id, now).unwrap();
    {
        let sq = rig.sequencer.sequence(id).unwrap();
        assert!(sq.commands[0].is_active, "both moves fire together");
        assert!(sq.commands[1].is_active, "both moves fire together");
        assert!(sq.commands[2].is_active);
        assert_eq!(sq.playhead(), Some(2), "playhead waits at the barrier");
        assert!(sq.is_waiting);
    }

    // Nothing converged yet; the tick must leave the sequence waiting.
    rig.sequencer.tick(now);
    assert!(rig.sequencer.sequence(id).unwrap().is_active);

    // One second at rate 10 reaches both targets.
    advance_all(&rig, 1.0);
    rig.sequencer.tick(now + Duration::seconds(1));

    let sq = rig.sequencer.sequence(id).unwrap();
    assert!(sq.is_finished);
    assert!(!sq.is_active);
    assert!((rig.servos[0].position() - 10.0).abs() < 1e-6);
    assert!((rig.servos[1].position() - 5.0).abs() < 1e-6);
}

#[test]
fn looped_batch_restarts_instead_of_finishing() {
    let mut rig = rig();
    let now = Utc::now();

    let id = rig.sequencer.create_sequence("looped");
    {
        let sq = rig.sequencer.sequence_mut(id).unwrap();
        sq.is_looped = true;
        sq.commands = vec![
            Command::move_servo(ServoUid(1), 10.0, 1.0),
            Command::wait_for_moves(),
        ];
    }

    rig.sequencer.start_sequence(id, now).unwrap();
    advance_all(&rig, 1.0);
    rig.sequencer.tick(now + Duration::seconds(1));

    let sq = rig.sequencer.sequence(id).unwrap();
    assert!(!sq.is_finished, "looped sequences restart");
    assert!(sq.is_active);
    assert!(sq.commands[0].is_active, "first command re-fired");
}

#[test]
fn goto_loop_runs_three_passes_then_stops() {
    let mut rig = rig();
    let mut now = Utc::now();

    let id = rig.sequencer.create_sequence("loop");
    {
        let sq = rig.sequencer.sequence_mut(id).unwrap();
        sq.commands = vec![
            Command::move_servo(ServoUid(1), 1.0, 1.0),
            Command::goto(0, 2),
        ];
    }

    rig.sequencer.start_sequence(id, now).unwrap();
    let mut passes = 1; // the initial pass is already running

    // Each round converges the move, then ticks. The move converges every
    // round, so it is only active after a tick when the goto rewound.
    for _ in 0..10 {
        advance_all(&rig, 1.0);
        now += Duration::seconds(1);

        rig.sequencer.tick(now);
        let sq = rig.sequencer.sequence(id).unwrap();
        if sq.is_finished {
            break;
        }
        if sq.commands[0].is_active {
            passes += 1;
        }
    }

    let sq = rig.sequencer.sequence(id).unwrap();
    assert!(sq.is_finished);
    assert_eq!(passes, 3, "initial pass plus two repeats");
    assert_eq!(goto_counter(&sq.commands[1]), 0);
}

#[test]
fn goto_counter_decrements_then_rearms_on_stop() {
    let mut rig = rig();
    let mut now = Utc::now();

    let id = rig.sequencer.create_sequence("rearm");
    {
        let sq = rig.sequencer.sequence_mut(id).unwrap();
        sq.commands = vec![
            Command::move_servo(ServoUid(1), 1.0, 1.0),
            Command::goto(0, 2),
        ];
    }

    rig.sequencer.start_sequence(id, now).unwrap();
    advance_all(&rig, 1.0);
    now += Duration::seconds(1);
    rig.sequencer.tick(now);

    // The goto fired once: 2 -> 1, second pass in flight.
    assert_eq!(
        goto_counter(&rig.sequencer.sequence(id).unwrap().commands[1]),
        1
    );

    // An explicit stop restores the authored repeat count.
    rig.sequencer.pause_sequence(id, now).unwrap();
    assert_eq!(
        goto_counter(&rig.sequencer.sequence(id).unwrap().commands[1]),
        2
    );
}

#[test]
fn infinite_goto_keeps_looping() {
    let mut rig = rig();
    let mut now = Utc::now();

    let id = rig.sequencer.create_sequence("forever");
    {
        let sq = rig.sequencer.sequence_mut(id).unwrap();
        sq.commands = vec![
            Command::move_servo(ServoUid(1), 1.0, 1.0),
            Command::goto(0, -1),
        ];
    }

    rig.sequencer.start_sequence(id, now).unwrap();
    for _ in 0..5 {
        advance_all(&rig, 1.0);
        now += Duration::seconds(1);
        rig.sequencer.tick(now);
        let sq = rig.sequencer.sequence(id).unwrap();
        assert!(!sq.is_finished);
        assert!(sq.is_active);
        assert_eq!(goto_counter(&sq.commands[1]), -1);
    }
}

#[test]
fn servo_contention_locks_and_releases_within_a_tick() {
    let mut rig = rig();
    let now = Utc::now();

    let a = rig.sequencer.create_sequence("a");
    rig.sequencer.sequence_mut(a).unwrap().commands =
        vec![Command::move_servo(ServoUid(1), 90.0, 1.0)];

    let b = rig.sequencer.create_sequence("b");
    rig.sequencer.sequence_mut(b).unwrap().commands = vec![
        Command::move_servo(ServoUid(1), 10.0, 1.0),
        Command::delay(1.0),
    ];

    let c = rig.sequencer.create_sequence("c");
    rig.sequencer.sequence_mut(c).unwrap().commands =
        vec![Command::move_servo(ServoUid(2), 10.0, 1.0)];

    rig.sequencer.start_sequence(a, now).unwrap();
    rig.sequencer.tick(now);

    assert!(
        rig.sequencer.sequence(b).unwrap().is_locked,
        "b shares servo 1 with the active a"
    );
    assert!(
        !rig.sequencer.sequence(a).unwrap().is_locked,
        "a never locks itself out"
    );
    assert!(
        !rig.sequencer.sequence(c).unwrap().is_locked,
        "c touches a different servo"
    );

    // A locked sequence refuses to start.
    rig.sequencer.start_sequence(b, now).unwrap();
    assert!(!rig.sequencer.sequence(b).unwrap().is_active);

    // Once a stops, the next tick releases the lock.
    rig.sequencer.pause_sequence(a, now).unwrap();
    rig.sequencer.tick(now);
    assert!(!rig.sequencer.sequence(b).unwrap().is_locked);
}

#[test]
fn state_change_pauses_foreign_sequences_and_auto_starts() {
    let mut rig = rig();
    let now = Utc::now();

    let s2 = rig.sequencer.add_state("Deployed");

    // X transitions the machine from the default state to s2.
    let x = rig.sequencer.create_sequence("x");
    {
        let sq = rig.sequencer.sequence_mut(x).unwrap();
        sq.end_state = s2;
        sq.commands = vec![Command::delay(0.0)];
    }

    // Y runs in the default state and is not auto-start; it must never start on its own.
    let y = rig.sequencer.create_sequence("y");
    rig.sequencer.sequence_mut(y).unwrap().commands = vec![Command::delay(5.0)];

    // W is another state-changer; it must be locked while X runs.
    let w = rig.sequencer.create_sequence("w");
    {
        let sq = rig.sequencer.sequence_mut(w).unwrap();
        sq.end_state = s2;
        sq.commands = vec![Command::delay(5.0)];
    }

    // Z lives in s2 and auto-starts on arrival.
    let z = rig.sequencer.create_sequence("z");
    {
        let sq = rig.sequencer.sequence_mut(z).unwrap();
        sq.start_state = s2;
        sq.end_state = s2;
        sq.auto_start = true;
        sq.commands = vec![Command::delay(5.0)];
    }

    rig.sequencer.start_sequence(x, now).unwrap();

    // Z cannot be started manually while the machine is not in s2.
    rig.sequencer.start_sequence(z, now).unwrap();
    assert!(!rig.sequencer.sequence(z).unwrap().is_active);

    rig.sequencer.tick(now);

    assert_eq!(rig.sequencer.current_state(), s2);
    assert!(!rig.sequencer.sequence(y).unwrap().is_active);
    assert!(!rig.sequencer.sequence(w).unwrap().is_active);
    assert!(
        rig.sequencer.sequence(z).unwrap().is_active,
        "auto-start fires in the same tick's state-change handler"
    );
    // The finished state-changer was reset for reuse.
    let x_seq = rig.sequencer.sequence(x).unwrap();
    assert!(!x_seq.is_finished);
    assert_eq!(x_seq.playhead(), None);
}

#[test]
fn state_changers_are_mutually_exclusive() {
    let mut rig = rig();
    let now = Utc::now();

    let s2 = rig.sequencer.add_state("Deployed");

    let x = rig.sequencer.create_sequence("x");
    {
        let sq = rig.sequencer.sequence_mut(x).unwrap();
        sq.end_state = s2;
        sq.commands = vec![Command::delay(10.0)];
    }
    let w = rig.sequencer.create_sequence("w");
    {
        let sq = rig.sequencer.sequence_mut(w).unwrap();
        sq.end_state = s2;
        sq.commands = vec![Command::delay(10.0)];
    }

    rig.sequencer.start_sequence(x, now).unwrap();
    rig.sequencer.tick(now);

    assert!(rig.sequencer.sequence(w).unwrap().is_locked);
    assert!(!rig.sequencer.sequence(x).unwrap().is_locked);

    // With no state-changer active the lock lifts machine-wide.
    rig.sequencer.pause_sequence(x, now).unwrap();
    rig.sequencer.tick(now);
    assert!(!rig.sequencer.sequence(w).unwrap().is_locked);
}

#[test]
fn tick_is_idempotent_at_fixed_time() {
    let mut rig = rig();
    let now = Utc::now();

    let id = rig.sequencer.create_sequence("idem");
    {
        let sq = rig.sequencer.sequence_mut(id).unwrap();
        sq.commands = vec![
            Command::move_servo(ServoUid(1), 50.0, 1.0),
            Command::delay(10.0),
            Command::goto(0, 3),
        ];
    }
    rig.sequencer.start_sequence(id, now).unwrap();

    rig.sequencer.tick(now);
    let first = snapshot(&rig.sequencer, id);

    // Re-running the tick with zero elapsed time and unchanged servos must
    // not double-apply anything.
    rig.sequencer.tick(now);
    assert_eq!(first, snapshot(&rig.sequencer, id));
    rig.sequencer.tick(now);
    rig.sequencer.tick(now);
    assert_eq!(first, snapshot(&rig.sequencer, id));

    fn snapshot(
        sequencer: &Sequencer,
        id: seq_core::SequenceId,
    ) -> (Vec<Command>, bool, bool, bool, Option<usize>) {
        let sq = sequencer.sequence(id).unwrap();
        (
            sq.commands.clone(),
            sq.is_active,
            sq.is_finished,
            sq.is_waiting,
            sq.playhead(),
        )
    }
}

#[test]
fn editor_environment_satisfies_group_waits_immediately() {
    let mut rig = rig();
    rig.sequencer.set_environment(Environment::Editor);
    let now = Utc::now();

    let id = rig.sequencer.create_sequence("preview");
    rig.sequencer.sequence_mut(id).unwrap().commands = vec![Command::wait_for_group(
        seq_core::GroupRef::Builtin(seq_core::BuiltinGroup::Gear),
    )];

    rig.sequencer.start_sequence(id, now).unwrap();
    rig.sequencer.tick(now);
    rig.sequencer.tick(now);

    assert!(rig.sequencer.sequence(id).unwrap().is_finished);
}

#[test]
fn flight_group_wait_blocks_until_toggled() {
    let registry = Arc::new(ServoRegistry::new());
    let groups = Arc::new(SimActionGroups::new());
    let mut sequencer = Sequencer::new(
        registry,
        groups.clone(),
        Arc::new(ExtendedGroups::absent()),
        Environment::Flight,
    );
    let now = Utc::now();

    let id = sequencer.create_sequence("wait-gear");
    sequencer.sequence_mut(id).unwrap().commands = vec![Command::wait_for_group(
        seq_core::GroupRef::Builtin(seq_core::BuiltinGroup::Gear),
    )];

    sequencer.start_sequence(id, now).unwrap();
    sequencer.tick(now);
    assert!(sequencer.sequence(id).unwrap().is_active);

    groups.set(seq_core::BuiltinGroup::Gear, true);
    sequencer.tick(now);
    sequencer.tick(now);
    assert!(sequencer.sequence(id).unwrap().is_finished);
}
