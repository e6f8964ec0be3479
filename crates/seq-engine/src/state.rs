//! Sequencer states
//!
//! A state is a named node in the owning machine's state graph. It has no
//! behavior of its own; sequences reference states to declare where they
//! may run and where finishing takes the machine.

use seq_core::StateId;
use serde::{Deserialize, Serialize};

/// A node in the sequencer's finite state graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerState {
    /// Stable identity, generated once
    pub id: StateId,

    /// Display name
    pub name: String,
}

impl SequencerState {
    /// Create a state with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: StateId::new(),
            name: name.into(),
        }
    }

    /// Rebuild a state with a known id (used by the loader)
    pub fn restore(id: StateId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_unique() {
        assert_ne!(SequencerState::new("a").id, SequencerState::new("b").id);
    }

    #[test]
    fn test_restore_preserves_id() {
        let id = StateId::new();
        let state = SequencerState::restore(id, "Deployed");
        assert_eq!(state.id, id);
        assert_eq!(state.name, "Deployed");
    }
}
