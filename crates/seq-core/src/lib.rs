//! Core types for the servo sequencer
//!
//! This crate provides the fundamental types used throughout the sequencer:
//! identities (ServoUid, SequenceId, StateId), action group references, and
//! the command model.

mod command;
mod group;
mod id;

pub use command::{Command, CommandKind};
pub use group::{BuiltinGroup, GroupError, GroupRef};
pub use id::{SequenceId, ServoUid, StateId};

/// Canonical tolerance for servo position convergence.
///
/// A `MoveServo` command is considered complete once the servo's reported
/// position is within this distance of the commanded target.
pub const POSITION_EPSILON: f32 = 1e-3;

/// Goto counter value meaning "repeat forever".
pub const GOTO_INFINITE: i32 = -1;
