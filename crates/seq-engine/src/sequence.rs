//! Sequences and the playhead algorithm
//!
//! A sequence is an ordered program of commands plus a playhead and run
//! flags. Resume implements the batching rule authors rely on: every
//! fire-and-forget command before the next blocking command executes
//! immediately in index order, then the sequence waits at the blocking one.

use std::collections::HashSet;

use seq_core::{Command, SequenceId, ServoUid, StateId};
use tracing::{debug, warn};

use crate::context::ExecContext;

/// An executable program of commands owned by a sequencer
#[derive(Debug, Clone)]
pub struct Sequence {
    /// Stable identity, preserved across edits
    id: SequenceId,

    /// Display name
    pub name: String,

    /// The program. Mutable at edit time; running sequences are only
    /// touched through the explicit edit operations, which reset first.
    pub commands: Vec<Command>,

    /// Restart from the top on completion
    pub is_looped: bool,

    /// Started by the state-change handler when the machine enters
    /// `start_state`
    pub auto_start: bool,

    /// Keyboard shortcut label, free text
    pub key_shortcut: String,

    /// The state the machine must be in for this sequence to run
    pub start_state: StateId,

    /// The state the machine transitions to when this sequence finishes
    pub end_state: StateId,

    /// Currently executing
    pub is_active: bool,

    /// Ran to completion (non-looped)
    pub is_finished: bool,

    /// Blocked at a wait-kind command
    pub is_waiting: bool,

    /// Advisory lock computed by the owning sequencer; a locked sequence
    /// refuses start/resume/pause
    pub is_locked: bool,

    /// Index of the current command boundary; `None` until started or
    /// after a reset, one past the end once finished
    pub(crate) playhead: Option<usize>,
}

impl Sequence {
    /// Create an empty sequence with a fresh id
    pub fn new(name: impl Into<String>, start_state: StateId, end_state: StateId) -> Self {
        Self {
            id: SequenceId::new(),
            name: name.into(),
            commands: Vec::new(),
            is_looped: false,
            auto_start: false,
            key_shortcut: String::new(),
            start_state,
            end_state,
            is_active: false,
            is_finished: false,
            is_waiting: false,
            is_locked: false,
            playhead: None,
        }
    }

    /// Copy this sequence: commands by value, fresh id, prefixed name
    pub fn duplicate(&self) -> Self {
        let mut copy = Self::new(
            format!("Copy of {}", self.name),
            self.start_state,
            self.end_state,
        );
        copy.commands = self.commands.clone();
        for cmd in &mut copy.commands {
            cmd.clear();
        }
        copy.is_looped = self.is_looped;
        copy.auto_start = self.auto_start;
        copy.key_shortcut = self.key_shortcut.clone();
        copy
    }

    /// Stable identity
    pub fn id(&self) -> SequenceId {
        self.id
    }

    /// Current playhead position
    pub fn playhead(&self) -> Option<usize> {
        self.playhead
    }

    /// Whether finishing this sequence moves the machine to another state
    pub fn changes_state(&self) -> bool {
        self.start_state != self.end_state
    }

    /// Index of the first command that has not finished
    pub fn first_unfinished(&self) -> Option<usize> {
        self.commands.iter().position(|c| !c.is_finished)
    }

    /// The set of servos this sequence's commands drive
    pub fn affected_servos(&self) -> HashSet<ServoUid> {
        self.commands
            .iter()
            .filter_map(|c| c.referenced_servo())
            .collect()
    }

    /// Whether any command drives one of `servos`
    pub fn references_any(&self, servos: &HashSet<ServoUid>) -> bool {
        self.commands
            .iter()
            .filter_map(|c| c.referenced_servo())
            .any(|uid| servos.contains(&uid))
    }

    /// Progress was made but nothing is currently executing
    pub fn is_paused(&self) -> bool {
        match self.playhead {
            Some(i) => i < self.commands.len() && !self.commands[i].is_active,
            None => false,
        }
    }

    /// Begin or continue execution from the first unfinished command
    ///
    /// No-op when locked or when the machine is not in this sequence's
    /// start state. A previously finished sequence resets first; a fully
    /// finished looped sequence restarts from the top.
    pub fn start(&mut self, current_state: StateId, ctx: &ExecContext) {
        if self.is_locked {
            warn!(sequence = %self.name, "Refusing to start a locked sequence");
            return;
        }
        if self.start_state != current_state {
            warn!(
                sequence = %self.name,
                "Refusing to start: machine is not in this sequence's start state"
            );
            return;
        }
        if self.commands.is_empty() {
            warn!(sequence = %self.name, "Refusing to start an empty sequence");
            return;
        }

        if self.is_finished {
            self.reset(ctx);
        }

        let next = match self.first_unfinished() {
            Some(index) => index,
            None => {
                if self.is_looped {
                    self.reset(ctx);
                    match self.first_unfinished() {
                        Some(index) => index,
                        None => {
                            self.set_finished();
                            return;
                        }
                    }
                } else {
                    self.set_finished();
                    return;
                }
            }
        };

        self.resume(next, ctx);
    }

    /// Continue execution from `from`
    ///
    /// Executes every command strictly before the next blocking command
    /// immediately, in index order; if a blocking command exists it is
    /// executed too, the sequence marks itself waiting, and the playhead
    /// stops there.
    pub fn resume(&mut self, from: usize, ctx: &ExecContext) {
        if self.is_locked {
            warn!(sequence = %self.name, "Refusing to resume a locked sequence");
            return;
        }
        if self.commands.is_empty() {
            warn!(sequence = %self.name, "Refusing to resume an empty sequence");
            return;
        }

        let from = from.min(self.commands.len() - 1);
        debug!(sequence = %self.name, from, "Resuming");

        self.is_active = true;
        self.playhead = Some(from);

        let boundary = self.commands[from..]
            .iter()
            .position(|c| c.is_blocking())
            .map(|offset| from + offset);

        let run_until = boundary.unwrap_or(self.commands.len());
        for index in from..run_until {
            ctx.execute(&mut self.commands[index]);
        }

        if let Some(boundary) = boundary {
            ctx.execute(&mut self.commands[boundary]);
            self.is_waiting = true;
            self.playhead = Some(boundary);
        }
    }

    /// Execute exactly one command and force it finished
    ///
    /// Single-instruction debugging semantics: the command runs, is
    /// immediately marked finished, and the playhead advances one slot.
    /// The sequence is left paused rather than active so the scheduler
    /// does not carry it forward.
    pub fn step(&mut self, current_state: StateId, ctx: &ExecContext) {
        if self.is_locked {
            warn!(sequence = %self.name, "Refusing to step a locked sequence");
            return;
        }
        if self.start_state != current_state {
            warn!(
                sequence = %self.name,
                "Refusing to step: machine is not in this sequence's start state"
            );
            return;
        }
        if self.commands.is_empty() {
            return;
        }

        if self.is_finished {
            self.reset(ctx);
        }

        let index = match self.first_unfinished() {
            Some(index) => index,
            None => {
                if self.is_looped {
                    self.reset(ctx);
                    0
                } else {
                    self.set_finished();
                    return;
                }
            }
        };

        ctx.execute(&mut self.commands[index]);
        self.commands[index].finish();
        self.playhead = Some(index + 1);
        self.is_waiting = true;
    }

    /// Stop execution, preserving completed progress
    ///
    /// Stops the first active command and everything after it; commands
    /// that already finished stay finished, so a later start continues
    /// where the sequence left off.
    pub fn pause(&mut self, ctx: &ExecContext) {
        if self.is_locked {
            warn!(sequence = %self.name, "Refusing to pause a locked sequence");
            return;
        }

        let from = self
            .commands
            .iter()
            .position(|c| c.is_active)
            .unwrap_or_else(|| {
                self.commands
                    .iter()
                    .rposition(|c| c.is_finished)
                    .map(|i| i + 1)
                    .unwrap_or(0)
            });

        for cmd in self.commands.iter_mut().skip(from) {
            ctx.stop(cmd);
        }

        self.is_active = false;
        self.is_waiting = false;
        debug!(sequence = %self.name, "Paused");
    }

    /// Rewind to the initial state
    pub fn reset(&mut self, ctx: &ExecContext) {
        self.playhead = None;
        self.is_active = false;
        self.is_finished = false;
        self.is_waiting = false;
        for cmd in &mut self.commands {
            ctx.stop(cmd);
        }
        debug!(sequence = %self.name, "Reset");
    }

    /// Mark the whole program finished
    pub fn set_finished(&mut self) {
        self.is_active = false;
        self.is_waiting = false;
        self.is_finished = true;
        for cmd in &mut self.commands {
            cmd.finish();
        }
    }

    /// Append a command, resetting any execution progress first
    pub fn add_command(&mut self, cmd: Command, ctx: &ExecContext) {
        self.pause(ctx);
        self.reset(ctx);
        self.commands.push(cmd);
    }

    /// Insert a command at `index`, resetting any execution progress first
    pub fn insert_command(&mut self, index: usize, cmd: Command, ctx: &ExecContext) {
        self.pause(ctx);
        self.reset(ctx);
        let index = index.min(self.commands.len());
        self.commands.insert(index, cmd);
    }

    /// Remove the command at `index`, resetting any execution progress first
    pub fn remove_command(&mut self, index: usize, ctx: &ExecContext) -> Option<Command> {
        if index >= self.commands.len() {
            return None;
        }
        self.pause(ctx);
        self.reset(ctx);
        Some(self.commands.remove(index))
    }
}
