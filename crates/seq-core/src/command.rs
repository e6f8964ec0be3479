//! Command model
//!
//! A command is one instruction inside a sequence: move a servo, wait,
//! toggle or wait on an action group, or jump. The kind is an explicit sum
//! type so illegal combinations (a goto that is also a servo move) are
//! unrepresentable; runtime execution flags are shared by all kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GroupRef, ServoUid, GOTO_INFINITE};

/// What a command does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Move a servo to a target position at a speed multiplier
    MoveServo {
        servo: ServoUid,
        target_position: f32,
        speed_multiplier: f32,
    },

    /// Wait a fixed number of seconds
    Delay { seconds: f32 },

    /// Wait until no other command in the sequence is still active
    WaitForMoves,

    /// Wait until the referenced group's state reads true
    WaitForActionGroup { group: GroupRef },

    /// Toggle the referenced group; applied synchronously, never awaited
    ToggleActionGroup { group: GroupRef },

    /// Jump back to `target`, `counter` times (-1 = forever)
    ///
    /// `original_counter` retains the authored repeat count so an explicit
    /// stop can rearm the loop.
    Goto {
        target: usize,
        counter: i32,
        original_counter: i32,
    },
}

impl CommandKind {
    /// Commands that must be awaited rather than fired and forgotten
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            CommandKind::Delay { .. }
                | CommandKind::WaitForMoves
                | CommandKind::WaitForActionGroup { .. }
                | CommandKind::Goto { .. }
        )
    }
}

/// A command plus its runtime execution state
///
/// Invariant: `is_active` and `is_finished` are never both true. A command
/// is either in flight, done, or untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// The instruction itself
    pub kind: CommandKind,

    /// Currently executing (set by execute, cleared by finish/stop)
    #[serde(skip)]
    pub is_active: bool,

    /// Completed (set by the scheduler's completion test or a forced finish)
    #[serde(skip)]
    pub is_finished: bool,

    /// When execution started, for delay expiry
    #[serde(skip)]
    pub time_started: Option<DateTime<Utc>>,
}

impl Command {
    /// Wrap a kind with fresh runtime state
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            is_active: false,
            is_finished: false,
            time_started: None,
        }
    }

    /// Servo move command
    pub fn move_servo(servo: ServoUid, target_position: f32, speed_multiplier: f32) -> Self {
        Self::new(CommandKind::MoveServo {
            servo,
            target_position,
            speed_multiplier,
        })
    }

    /// Fixed delay command
    pub fn delay(seconds: f32) -> Self {
        Self::new(CommandKind::Delay { seconds })
    }

    /// Wait until all other active commands complete
    pub fn wait_for_moves() -> Self {
        Self::new(CommandKind::WaitForMoves)
    }

    /// Wait until a group reads true
    pub fn wait_for_group(group: GroupRef) -> Self {
        Self::new(CommandKind::WaitForActionGroup { group })
    }

    /// Toggle a group
    pub fn toggle_group(group: GroupRef) -> Self {
        Self::new(CommandKind::ToggleActionGroup { group })
    }

    /// Jump to `target`, repeating `counter` times (-1 = forever)
    pub fn goto(target: usize, counter: i32) -> Self {
        Self::new(CommandKind::Goto {
            target,
            counter,
            original_counter: counter,
        })
    }

    /// Whether this command must be awaited
    pub fn is_blocking(&self) -> bool {
        self.kind.is_blocking()
    }

    /// The servo this command drives, if any
    pub fn referenced_servo(&self) -> Option<ServoUid> {
        match self.kind {
            CommandKind::MoveServo { servo, .. } => Some(servo),
            _ => None,
        }
    }

    /// Mark completed
    pub fn finish(&mut self) {
        self.is_active = false;
        self.is_finished = true;
    }

    /// Clear all runtime state, rearming a goto's repeat counter
    pub fn clear(&mut self) {
        self.is_active = false;
        self.is_finished = false;
        self.time_started = None;
        if let CommandKind::Goto {
            counter,
            original_counter,
            ..
        } = &mut self.kind
        {
            *counter = *original_counter;
        }
    }

    /// Whether the goto counter permits another iteration
    ///
    /// Always false for non-goto commands.
    pub fn goto_may_repeat(&self) -> bool {
        match self.kind {
            CommandKind::Goto { counter, .. } => counter > 0 || counter == GOTO_INFINITE,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BuiltinGroup;

    #[test]
    fn test_blocking_classification() {
        assert!(Command::delay(1.0).is_blocking());
        assert!(Command::wait_for_moves().is_blocking());
        assert!(Command::wait_for_group(GroupRef::Builtin(BuiltinGroup::Gear)).is_blocking());
        assert!(Command::goto(0, 2).is_blocking());

        assert!(!Command::move_servo(ServoUid(1), 10.0, 1.0).is_blocking());
        assert!(!Command::toggle_group(GroupRef::Builtin(BuiltinGroup::Lights)).is_blocking());
    }

    #[test]
    fn test_finish_clears_active() {
        let mut cmd = Command::delay(1.0);
        cmd.is_active = true;
        cmd.finish();
        assert!(!cmd.is_active);
        assert!(cmd.is_finished);
    }

    #[test]
    fn test_clear_rearms_goto_counter() {
        let mut cmd = Command::goto(0, 3);
        if let CommandKind::Goto { counter, .. } = &mut cmd.kind {
            *counter = 1;
        }
        cmd.is_finished = true;
        cmd.clear();

        assert!(!cmd.is_finished);
        assert!(matches!(
            cmd.kind,
            CommandKind::Goto {
                counter: 3,
                original_counter: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_goto_may_repeat() {
        assert!(Command::goto(0, 2).goto_may_repeat());
        assert!(Command::goto(0, GOTO_INFINITE).goto_may_repeat());
        assert!(!Command::goto(0, 0).goto_may_repeat());
        assert!(!Command::delay(1.0).goto_may_repeat());
    }

    #[test]
    fn test_referenced_servo() {
        assert_eq!(
            Command::move_servo(ServoUid(7), 0.0, 1.0).referenced_servo(),
            Some(ServoUid(7))
        );
        assert_eq!(Command::delay(1.0).referenced_servo(), None);
    }

    #[test]
    fn test_kind_serde_roundtrip() {
        let cmd = Command::move_servo(ServoUid(3), 45.0, 0.5);
        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, cmd.kind);
        assert!(!back.is_active);
    }
}
