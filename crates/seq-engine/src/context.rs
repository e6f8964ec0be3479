//! Execution context
//!
//! Everything a command needs to act on the outside world: the servo
//! registry, both action-group providers, the execution environment, and
//! the current tick's timestamp. The context is rebuilt every tick so `now`
//! is consistent across all commands processed in that tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use seq_actuator::{ActionGroups, ExtendedGroups, ServoRegistry};
use seq_core::{Command, CommandKind, GroupRef};
use tracing::warn;

/// Where the sequencer is running
///
/// In the editor environment there is no live vehicle to toggle groups on,
/// so action-group waits are treated as immediately satisfied. This lets
/// authors preview sequencing; it is a deliberate simplification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Live vehicle: group waits poll the real providers
    Flight,
    /// Design-time preview: group waits complete immediately
    Editor,
}

/// Collaborator access for command execution within one tick
#[derive(Clone)]
pub struct ExecContext {
    /// The owning vehicle's servos
    pub servos: Arc<ServoRegistry>,
    /// Built-in action groups
    pub groups: Arc<dyn ActionGroups>,
    /// Optional extended action groups, fail-closed
    pub extended: Arc<ExtendedGroups>,
    /// Flight or editor semantics
    pub environment: Environment,
    /// Timestamp shared by every command processed this tick
    pub now: DateTime<Utc>,
}

impl ExecContext {
    /// Toggle a group on whichever provider owns it
    pub fn toggle_group(&self, group: GroupRef) {
        match group {
            GroupRef::Builtin(builtin) => self.groups.toggle(builtin),
            GroupRef::Extended(id) => self.extended.toggle_group(id),
        }
    }

    /// Read a group's state from whichever provider owns it
    pub fn group_state(&self, group: GroupRef) -> bool {
        match group {
            GroupRef::Builtin(builtin) => self.groups.state(builtin),
            GroupRef::Extended(id) => self.extended.group_state(id),
        }
    }

    /// Begin executing a command
    ///
    /// Marks it active and stamps the start time. Toggles apply
    /// synchronously and finish immediately; servo moves are issued and
    /// left active until the scheduler observes position convergence;
    /// blocking kinds stay active until their completion test passes.
    pub fn execute(&self, cmd: &mut Command) {
        cmd.is_active = true;
        cmd.is_finished = false;
        cmd.time_started = Some(self.now);

        match &cmd.kind {
            CommandKind::ToggleActionGroup { group } => {
                self.toggle_group(*group);
                cmd.finish();
            }
            CommandKind::MoveServo {
                servo,
                target_position,
                speed_multiplier,
            } => match self.servos.get(*servo) {
                Some(actuator) => actuator.move_to(*target_position, *speed_multiplier),
                None => {
                    // Dangling reference: the move can never converge, so
                    // complete it rather than hang the sequence.
                    warn!(uid = %servo, "MoveServo references a missing servo, completing immediately");
                    cmd.finish();
                }
            },
            _ => {}
        }
    }

    /// Stop a command, clearing its runtime state
    ///
    /// Rearms a goto's repeat counter to its authored value and tells the
    /// servo to hold position for in-flight moves.
    pub fn stop(&self, cmd: &mut Command) {
        if let CommandKind::MoveServo { servo, .. } = cmd.kind {
            if let Some(actuator) = self.servos.get(servo) {
                actuator.stop();
            }
        }
        cmd.clear();
    }
}
