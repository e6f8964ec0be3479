//! Sequencer state wire format

use seq_core::StateId;
use seq_engine::SequencerState;
use tracing::warn;

use crate::{sanitize, FormatError, FormatResult, CHUNK_SEPARATOR};

/// Serialize one state as `stateId:stateName`
pub fn serialize_state(state: &SequencerState) -> String {
    format!("{}:{}", state.id, sanitize(&state.name))
}

/// Serialize a list of states into a `$`-separated document
pub fn serialize_states(states: &[SequencerState]) -> String {
    states
        .iter()
        .map(serialize_state)
        .collect::<Vec<_>>()
        .join(&CHUNK_SEPARATOR.to_string())
}

/// Parse one state chunk
pub fn parse_state(text: &str) -> FormatResult<SequencerState> {
    let (id, name) = text
        .split_once(':')
        .ok_or_else(|| FormatError::MalformedState(text.to_string()))?;
    let id: StateId = id
        .parse()
        .map_err(|_| FormatError::MalformedState(text.to_string()))?;
    Ok(SequencerState::restore(id, name))
}

/// Parse a `$`-separated document of states, skipping bad chunks
pub fn parse_states(document: &str) -> Vec<SequencerState> {
    if document.trim().is_empty() {
        return Vec::new();
    }
    document
        .split(CHUNK_SEPARATOR)
        .filter_map(|chunk| match parse_state(chunk) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(chunk, %err, "Skipping unparsable state");
                None
            }
        })
        .collect()
}
