//! Persisted text format for sequences and states
//!
//! The legacy pipe/colon format produced and consumed byte-for-byte:
//!
//! ```text
//! sequence: name|isLooped|keyShortcut|autoStart|startStateId|endStateId<:cmd1:cmd2:...>
//! command:  servoUidOrNull|position|speedMultiplier|wait|waitTime|gotoIndex|gotoCommandCounter|actionGroupIntOrNone[|extendedGroupId]
//! state:    stateId:stateName
//! ```
//!
//! Multiple sequences or states concatenate separated by `$`. The
//! characters `<`, `>`, and `|` are stripped from free-text fields before
//! serialization to keep the format unambiguous. Loading is
//! partial-failure tolerant: unparsable chunks are skipped with a warning,
//! never fatal.

mod command;
mod sequence;
mod state;

pub use command::{parse_command, serialize_command};
pub use sequence::{parse_sequence, parse_sequences, serialize_sequence, serialize_sequences};
pub use state::{parse_state, parse_states, serialize_state, serialize_states};

use seq_core::ServoUid;
use thiserror::Error;

/// Separator between serialized sequences or states
pub const CHUNK_SEPARATOR: char = '$';

/// Errors produced while parsing persisted text
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("wrong command field count: expected 8 or 9, got {0}")]
    FieldCount(usize),

    #[error("invalid number in field '{field}': {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid boolean in field '{field}': {value}")]
    InvalidBool { field: &'static str, value: String },

    #[error("unknown action group id: {0}")]
    UnknownGroup(i32),

    #[error("servo {0} is not present on the vehicle")]
    MissingServo(ServoUid),

    #[error("unrecognized command shape: {0}")]
    UnrecognizedCommand(String),

    #[error("malformed sequence chunk: {0}")]
    MalformedSequence(String),

    #[error("malformed state chunk: {0}")]
    MalformedState(String),
}

/// Result type for format operations
pub type FormatResult<T> = Result<T, FormatError>;

/// Strip the characters that would break the format from free text
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '<' | '>' | '|'))
        .collect()
}

pub(crate) fn parse_bool(field: &'static str, value: &str) -> FormatResult<bool> {
    match value {
        "true" | "True" => Ok(true),
        "false" | "False" => Ok(false),
        _ => Err(FormatError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

pub(crate) fn parse_f32(field: &'static str, value: &str) -> FormatResult<f32> {
    value.parse().map_err(|_| FormatError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

pub(crate) fn parse_i32(field: &'static str, value: &str) -> FormatResult<i32> {
    value.parse().map_err(|_| FormatError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
