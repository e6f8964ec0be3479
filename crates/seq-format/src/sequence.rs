//! Sequence wire format

use seq_actuator::ServoRegistry;
use seq_core::StateId;
use seq_engine::Sequence;
use tracing::warn;

use crate::{
    parse_bool, sanitize, serialize_command, FormatError, FormatResult, CHUNK_SEPARATOR,
};

/// Serialize one sequence, commands included
pub fn serialize_sequence(sequence: &Sequence) -> String {
    let mut out = format!(
        "{}|{}|{}|{}|{}|{}<",
        sanitize(&sequence.name),
        sequence.is_looped,
        sanitize(&sequence.key_shortcut),
        sequence.auto_start,
        sequence.start_state,
        sequence.end_state,
    );
    for cmd in &sequence.commands {
        out.push(':');
        out.push_str(&serialize_command(cmd));
    }
    out.push('>');
    out
}

/// Serialize a list of sequences into a `$`-separated document
pub fn serialize_sequences(sequences: &[Sequence]) -> String {
    sequences
        .iter()
        .map(serialize_sequence)
        .collect::<Vec<_>>()
        .join(&CHUNK_SEPARATOR.to_string())
}

/// Parse one sequence chunk
///
/// Commands that fail to parse (malformed text, missing servo) are dropped
/// individually; the sequence itself still loads. Missing or unparsable
/// state ids fall back to `default_state`, turning legacy data into a
/// non-state-changing sequence.
pub fn parse_sequence(
    text: &str,
    servos: &ServoRegistry,
    default_state: StateId,
) -> FormatResult<Sequence> {
    let (header, rest) = text
        .split_once('<')
        .ok_or_else(|| FormatError::MalformedSequence(text.to_string()))?;
    let body = rest
        .strip_suffix('>')
        .ok_or_else(|| FormatError::MalformedSequence(text.to_string()))?;

    let fields: Vec<&str> = header.split('|').collect();
    if fields.len() != 6 {
        return Err(FormatError::MalformedSequence(header.to_string()));
    }

    let start_state = match fields[4].parse::<StateId>() {
        Ok(id) => id,
        Err(_) => {
            warn!(sequence = fields[0], "Missing start state, using default");
            default_state
        }
    };
    let end_state = match fields[5].parse::<StateId>() {
        Ok(id) => id,
        Err(_) => {
            warn!(sequence = fields[0], "Missing end state, using default");
            default_state
        }
    };

    let mut sequence = Sequence::new(fields[0], start_state, end_state);
    sequence.is_looped = parse_bool("isLooped", fields[1])?;
    sequence.key_shortcut = fields[2].to_string();
    sequence.auto_start = parse_bool("autoStart", fields[3])?;

    for chunk in body.split(':').filter(|chunk| !chunk.is_empty()) {
        match crate::parse_command(chunk, servos) {
            Ok(cmd) => sequence.commands.push(cmd),
            Err(err) => warn!(sequence = %sequence.name, chunk, %err, "Dropping command"),
        }
    }

    Ok(sequence)
}

/// Parse a `$`-separated document of sequences, skipping bad chunks
pub fn parse_sequences(
    document: &str,
    servos: &ServoRegistry,
    default_state: StateId,
) -> Vec<Sequence> {
    if document.trim().is_empty() {
        return Vec::new();
    }
    document
        .split(CHUNK_SEPARATOR)
        .filter_map(
            |chunk| match parse_sequence(chunk, servos, default_state) {
                Ok(sequence) => Some(sequence),
                Err(err) => {
                    warn!(chunk, %err, "Skipping unparsable sequence");
                    None
                }
            },
        )
        .collect()
}
