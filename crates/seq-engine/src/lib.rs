//! Sequence execution engine
//!
//! This crate contains the sequencer core: the Sequence playhead algorithm,
//! the per-vehicle Sequencer (scheduler and finite state machine), the
//! inter-sequence locking policy, and a fixed-rate heartbeat runner.
//!
//! The engine is single-threaded and tick-driven. "Parallel" command
//! execution is simulated by marking several commands active within one
//! tick and letting the servo collaborators progress between ticks;
//! suspension is just flags re-evaluated against the clock each heartbeat.

mod context;
mod runner;
mod sequence;
mod sequencer;
mod state;

pub use context::{Environment, ExecContext};
pub use runner::Runner;
pub use sequence::Sequence;
pub use sequencer::{Sequencer, SequencerError, SequencerResult};
pub use state::SequencerState;
