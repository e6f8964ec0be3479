//! The per-vehicle sequencer
//!
//! Owns the state graph and the sequence list, and runs the fixed-rate
//! tick: advance every active sequence, compute the cross-sequence locking
//! policy, detect completion, and fire state transitions. One sequencer is
//! created per vehicle and passed by handle to anything that needs to
//! query or drive it; there is no process-wide instance.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use seq_actuator::{ActionGroups, ExtendedGroups, ServoRegistry};
use seq_core::{CommandKind, SequenceId, ServoUid, StateId, POSITION_EPSILON};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::{Environment, ExecContext};
use crate::sequence::Sequence;
use crate::state::SequencerState;

/// Sequencer control-surface errors
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("sequence not found: {0}")]
    SequenceNotFound(SequenceId),

    #[error("sequence position out of range: {0}")]
    PositionOutOfRange(usize),

    #[error("state not found: {0}")]
    StateNotFound(StateId),

    #[error("cannot remove the last sequencer state")]
    CannotRemoveLastState,
}

/// Result type for sequencer operations
pub type SequencerResult<T> = Result<T, SequencerError>;

/// Scheduler and finite state machine for one vehicle's sequences
pub struct Sequencer {
    /// State graph; never empty
    states: Vec<SequencerState>,

    /// All sequences, processed in list order each tick
    sequences: Vec<Sequence>,

    /// The state the machine is currently in; always a member of `states`
    current_state: StateId,

    /// Global kill-switch: a locked sequencer skips its tick entirely
    is_locked: bool,

    /// Disabled sequencers skip their tick entirely
    enabled: bool,

    environment: Environment,
    servos: Arc<ServoRegistry>,
    groups: Arc<dyn ActionGroups>,
    extended: Arc<ExtendedGroups>,
}

impl Sequencer {
    /// Create a sequencer with a single default state
    pub fn new(
        servos: Arc<ServoRegistry>,
        groups: Arc<dyn ActionGroups>,
        extended: Arc<ExtendedGroups>,
        environment: Environment,
    ) -> Self {
        let default_state = SequencerState::new("Default");
        let current_state = default_state.id;
        Self {
            states: vec![default_state],
            sequences: Vec::new(),
            current_state,
            is_locked: false,
            enabled: true,
            environment,
            servos,
            groups,
            extended,
        }
    }

    /// Build an execution context for `now`
    pub fn context(&self, now: DateTime<Utc>) -> ExecContext {
        ExecContext {
            servos: self.servos.clone(),
            groups: self.groups.clone(),
            extended: self.extended.clone(),
            environment: self.environment,
            now,
        }
    }

    // --- Queries ---

    /// The state graph
    pub fn states(&self) -> &[SequencerState] {
        &self.states
    }

    /// All sequences in processing order
    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// The machine's current state
    pub fn current_state(&self) -> StateId {
        self.current_state
    }

    /// The default state (first in the graph)
    pub fn default_state(&self) -> StateId {
        self.states[0].id
    }

    /// Look a state up by id
    pub fn state(&self, id: StateId) -> Option<&SequencerState> {
        self.states.iter().find(|s| s.id == id)
    }

    /// Look a sequence up by stable id
    pub fn sequence(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.id() == id)
    }

    /// Mutable access for edit-time operations
    ///
    /// Callers editing the command list must go through the sequence's edit
    /// operations, which reset execution progress first.
    pub fn sequence_mut(&mut self, id: SequenceId) -> Option<&mut Sequence> {
        self.sequences.iter_mut().find(|s| s.id() == id)
    }

    /// Whether the global kill-switch is engaged
    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    /// Engage or release the global kill-switch
    pub fn set_locked(&mut self, locked: bool) {
        self.is_locked = locked;
    }

    /// Enable or disable ticking
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Flight or editor semantics
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Switch between flight and editor semantics
    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
    }

    // --- State graph management ---

    /// Add a state, returning its id
    pub fn add_state(&mut self, name: impl Into<String>) -> StateId {
        let state = SequencerState::new(name);
        let id = state.id;
        debug!(state = %state.name, "Adding sequencer state");
        self.states.push(state);
        id
    }

    /// Rename a state
    pub fn rename_state(&mut self, id: StateId, name: impl Into<String>) -> SequencerResult<()> {
        let state = self
            .states
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(SequencerError::StateNotFound(id))?;
        state.name = name.into();
        Ok(())
    }

    /// Remove a state, reassigning affected sequences to the default state
    ///
    /// The last remaining state can never be removed. Sequences referencing
    /// the removed state are stopped and rebound to `states[0]`, as is
    /// `current_state` if it pointed at the removed state.
    pub fn remove_state(&mut self, id: StateId, now: DateTime<Utc>) -> SequencerResult<()> {
        if !self.states.iter().any(|s| s.id == id) {
            return Err(SequencerError::StateNotFound(id));
        }
        if self.states.len() == 1 {
            return Err(SequencerError::CannotRemoveLastState);
        }

        self.states.retain(|s| s.id != id);
        let fallback = self.states[0].id;
        let ctx = self.context(now);

        for sq in &mut self.sequences {
            if sq.start_state != id && sq.end_state != id {
                continue;
            }
            if sq.is_active {
                sq.pause(&ctx);
                sq.reset(&ctx);
            }
            if sq.start_state == id {
                sq.start_state = fallback;
            }
            if sq.end_state == id {
                sq.end_state = fallback;
            }
            warn!(sequence = %sq.name, "Reassigned sequence to the default state");
        }

        if self.current_state == id {
            self.current_state = fallback;
        }
        Ok(())
    }

    // --- Sequence management ---

    /// Create an empty sequence bound to the current state
    pub fn create_sequence(&mut self, name: impl Into<String>) -> SequenceId {
        let sequence = Sequence::new(name, self.current_state, self.current_state);
        let id = sequence.id();
        debug!(sequence = %sequence.name, "Created sequence");
        self.sequences.push(sequence);
        id
    }

    /// Add an existing sequence, rebinding unknown state references to the
    /// default state (legacy data is treated as not state-changing)
    pub fn add_sequence(&mut self, mut sequence: Sequence) -> SequenceId {
        let fallback = self.states[0].id;
        if self.state(sequence.start_state).is_none() {
            warn!(sequence = %sequence.name, "Unknown start state, using default");
            sequence.start_state = fallback;
        }
        if self.state(sequence.end_state).is_none() {
            warn!(sequence = %sequence.name, "Unknown end state, using default");
            sequence.end_state = fallback;
        }
        let id = sequence.id();
        self.sequences.push(sequence);
        id
    }

    /// Clone a sequence by value: fresh id, prefixed name
    pub fn clone_sequence(&mut self, id: SequenceId) -> SequencerResult<SequenceId> {
        let source = self
            .sequence(id)
            .ok_or(SequencerError::SequenceNotFound(id))?;
        let copy = source.duplicate();
        let copy_id = copy.id();
        self.sequences.push(copy);
        Ok(copy_id)
    }

    /// Delete a sequence, stopping it first
    pub fn remove_sequence(
        &mut self,
        id: SequenceId,
        now: DateTime<Utc>,
    ) -> SequencerResult<Sequence> {
        let index = self.index_of(id)?;
        let ctx = self.context(now);
        let sq = &mut self.sequences[index];
        sq.pause(&ctx);
        sq.reset(&ctx);
        info!(sequence = %sq.name, "Removing sequence");
        Ok(self.sequences.remove(index))
    }

    // --- Control surface (external callers address by id or position) ---

    /// Start a sequence by stable id
    pub fn start_sequence(&mut self, id: SequenceId, now: DateTime<Utc>) -> SequencerResult<()> {
        let ctx = self.context(now);
        let current = self.current_state;
        let index = self.index_of(id)?;
        self.sequences[index].start(current, &ctx);
        Ok(())
    }

    /// Pause a sequence by stable id
    pub fn pause_sequence(&mut self, id: SequenceId, now: DateTime<Utc>) -> SequencerResult<()> {
        let ctx = self.context(now);
        let index = self.index_of(id)?;
        self.sequences[index].pause(&ctx);
        Ok(())
    }

    /// Reset a sequence by stable id
    pub fn reset_sequence(&mut self, id: SequenceId, now: DateTime<Utc>) -> SequencerResult<()> {
        let ctx = self.context(now);
        let index = self.index_of(id)?;
        self.sequences[index].reset(&ctx);
        Ok(())
    }

    /// Single-step a sequence by stable id
    pub fn step_sequence(&mut self, id: SequenceId, now: DateTime<Utc>) -> SequencerResult<()> {
        let ctx = self.context(now);
        let current = self.current_state;
        let index = self.index_of(id)?;
        self.sequences[index].step(current, &ctx);
        Ok(())
    }

    /// Start a sequence by 1-based list position
    pub fn start_sequence_at(&mut self, position: usize, now: DateTime<Utc>) -> SequencerResult<()> {
        let id = self.id_at(position)?;
        self.start_sequence(id, now)
    }

    /// Pause a sequence by 1-based list position
    pub fn pause_sequence_at(&mut self, position: usize, now: DateTime<Utc>) -> SequencerResult<()> {
        let id = self.id_at(position)?;
        self.pause_sequence(id, now)
    }

    /// Reset a sequence by 1-based list position
    pub fn reset_sequence_at(&mut self, position: usize, now: DateTime<Utc>) -> SequencerResult<()> {
        let id = self.id_at(position)?;
        self.reset_sequence(id, now)
    }

    fn index_of(&self, id: SequenceId) -> SequencerResult<usize> {
        self.sequences
            .iter()
            .position(|s| s.id() == id)
            .ok_or(SequencerError::SequenceNotFound(id))
    }

    fn id_at(&self, position: usize) -> SequencerResult<SequenceId> {
        position
            .checked_sub(1)
            .and_then(|index| self.sequences.get(index))
            .map(|s| s.id())
            .ok_or(SequencerError::PositionOutOfRange(position))
    }

    // --- The tick ---

    /// Advance the whole machine by one fixed-rate heartbeat
    ///
    /// Repeated calls with the same `now` and unchanged external state are
    /// idempotent: completion and counter updates are guarded by the
    /// per-command active/finished flags.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if !self.enabled || self.is_locked || self.sequences.is_empty() {
            return;
        }

        if !self.sequences.iter().any(|s| s.is_active) {
            for sq in &mut self.sequences {
                sq.is_locked = false;
            }
            return;
        }

        self.recompute_locks();

        let ctx = self.context(now);
        for index in 0..self.sequences.len() {
            if !self.sequences[index].is_active {
                continue;
            }
            self.process_active_sequence(index, &ctx);
        }

        self.apply_state_transitions(&ctx);
    }

    /// Recompute every sequence's advisory lock from the active set
    ///
    /// Servo rule: an active sequence locks every sequence referencing any
    /// of its affected servos, but never itself. State rule: while any
    /// state-changing sequence is active, all state-changing sequences
    /// except the active ones are locked; with no active changer the state
    /// lock is lifted machine-wide.
    fn recompute_locks(&mut self) {
        for sq in &mut self.sequences {
            sq.is_locked = false;
        }

        let active: Vec<(usize, HashSet<ServoUid>)> = self
            .sequences
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_active)
            .map(|(index, s)| (index, s.affected_servos()))
            .collect();

        for (owner, affected) in &active {
            if !affected.is_empty() {
                for sq in &mut self.sequences {
                    if sq.references_any(affected) {
                        sq.is_locked = true;
                    }
                }
            }
            self.sequences[*owner].is_locked = false;
        }

        let changer_active = self
            .sequences
            .iter()
            .any(|s| s.is_active && s.changes_state());
        if changer_active {
            for sq in &mut self.sequences {
                if sq.changes_state() {
                    sq.is_locked = true;
                }
            }
            for sq in &mut self.sequences {
                if sq.is_active && sq.changes_state() {
                    sq.is_locked = false;
                }
            }
        }
    }

    fn process_active_sequence(&mut self, index: usize, ctx: &ExecContext) {
        let current_state = self.current_state;
        let released = {
            let sq = &mut self.sequences[index];
            Self::run_completion_tests(sq, ctx);
            Self::drain(sq, current_state, ctx)
        };

        // A sequence that finished this tick releases its servo locks
        // immediately rather than one tick later.
        if let Some(affected) = released {
            for sq in &mut self.sequences {
                if sq.references_any(&affected) {
                    sq.is_locked = false;
                }
            }
        }
    }

    /// Mark active commands finished once their completion condition holds
    fn run_completion_tests(sq: &mut Sequence, ctx: &ExecContext) {
        for cmd in &mut sq.commands {
            if !cmd.is_active {
                continue;
            }
            let done = match &cmd.kind {
                CommandKind::Delay { seconds } => cmd
                    .time_started
                    .map(|started| delay_elapsed(ctx.now, started, *seconds))
                    .unwrap_or(false),
                CommandKind::WaitForActionGroup { group } => {
                    // Editor previews have no live groups to toggle, so the
                    // wait is treated as immediately satisfied.
                    ctx.environment == Environment::Editor || ctx.group_state(*group)
                }
                CommandKind::MoveServo {
                    servo,
                    target_position,
                    ..
                } => match ctx.servos.get(*servo) {
                    Some(actuator) => {
                        (actuator.position() - target_position).abs() <= POSITION_EPSILON
                    }
                    None => true,
                },
                // Resolved by the drain step below, not by elapsed state
                CommandKind::WaitForMoves | CommandKind::Goto { .. } => false,
                CommandKind::ToggleActionGroup { .. } => false,
            };
            if done {
                cmd.finish();
            }
        }
    }

    /// Decide how the sequence proceeds after this tick's completions
    ///
    /// Returns the affected-servo set when the sequence just finished, so
    /// the caller can release its locks.
    fn drain(
        sq: &mut Sequence,
        current_state: StateId,
        ctx: &ExecContext,
    ) -> Option<HashSet<ServoUid>> {
        let active_count = sq.commands.iter().filter(|c| c.is_active).count();
        let waiting_count = sq
            .commands
            .iter()
            .filter(|c| c.is_active && c.is_blocking())
            .count();

        if active_count == 0 {
            if sq.commands.iter().any(|c| !c.is_finished) {
                // Burst drained; continue from the first unfinished point
                sq.start(current_state, ctx);
            } else if sq.is_looped {
                sq.reset(ctx);
                sq.start(current_state, ctx);
            } else {
                info!(sequence = %sq.name, "Sequence finished");
                sq.set_finished();
                sq.playhead = Some(sq.commands.len());
                return Some(sq.affected_servos());
            }
            return None;
        }

        if waiting_count > 0 {
            // A bare wait (no duration, no group) resolves only once it is
            // the sole remaining active command.
            if active_count != 1 || waiting_count != 1 {
                return None;
            }
            let Some(idx) = sq.playhead else {
                return None;
            };
            if idx >= sq.commands.len() || !sq.commands[idx].is_active {
                return None;
            }

            enum BareWait {
                Moves,
                Goto { target: usize },
            }
            let bare = match sq.commands[idx].kind {
                CommandKind::WaitForMoves => Some(BareWait::Moves),
                CommandKind::Goto { target, .. } => Some(BareWait::Goto { target }),
                _ => None,
            };

            match bare {
                Some(BareWait::Goto { target }) => {
                    let may_repeat = sq.commands[idx].goto_may_repeat();
                    sq.commands[idx].finish();
                    if may_repeat {
                        if let CommandKind::Goto { counter, .. } = &mut sq.commands[idx].kind {
                            if *counter > 0 {
                                *counter -= 1;
                            }
                        }
                        let target = target.min(sq.commands.len().saturating_sub(1));
                        for cmd in sq.commands.iter_mut().skip(target) {
                            cmd.is_active = false;
                            cmd.is_finished = false;
                        }
                        debug!(sequence = %sq.name, target, "Goto rewinding");
                        sq.resume(target, ctx);
                    } else {
                        debug!(sequence = %sq.name, "Goto counter exhausted");
                    }
                }
                Some(BareWait::Moves) => {
                    sq.commands[idx].finish();
                    sq.start(current_state, ctx);
                }
                None => {}
            }
            return None;
        }

        // Nothing waits; push into the next block
        if let Some(idx) = sq.playhead {
            if idx + 1 < sq.commands.len() {
                sq.resume(idx + 1, ctx);
            }
        }
        None
    }

    /// Transition the machine for every finished state-changing sequence
    fn apply_state_transitions(&mut self, ctx: &ExecContext) {
        for index in 0..self.sequences.len() {
            let (finished, changes, end_state) = {
                let sq = &self.sequences[index];
                (sq.is_finished, sq.changes_state(), sq.end_state)
            };
            if !finished || !changes {
                continue;
            }

            info!(
                sequence = %self.sequences[index].name,
                from = %self.current_state,
                to = %end_state,
                "State transition"
            );
            self.current_state = end_state;
            self.sequences[index].reset(ctx);
            self.on_state_changed(ctx);
        }
    }

    /// State-change handler: stop foreign sequences, refresh locks, then
    /// auto-start sequences that belong to the new state
    fn on_state_changed(&mut self, ctx: &ExecContext) {
        let new_state = self.current_state;

        for sq in &mut self.sequences {
            if sq.is_active && sq.start_state != new_state {
                debug!(sequence = %sq.name, "Stopping sequence outside the new state");
                sq.pause(ctx);
                sq.reset(ctx);
            }
        }

        self.recompute_locks();

        for index in 0..self.sequences.len() {
            let eligible = {
                let sq = &self.sequences[index];
                !sq.is_active && !sq.is_locked && sq.auto_start && sq.start_state == new_state
            };
            if eligible {
                debug!(sequence = %self.sequences[index].name, "Auto-starting");
                self.sequences[index].start(new_state, ctx);
            }
        }
    }
}

/// Whether a delay of `seconds` started at `started` has elapsed by `now`
fn delay_elapsed(now: DateTime<Utc>, started: DateTime<Utc>, seconds: f32) -> bool {
    let duration = std::time::Duration::from_secs_f32(seconds.max(0.0));
    match chrono::Duration::from_std(duration) {
        Ok(duration) => now >= started + duration,
        Err(_) => false,
    }
}
