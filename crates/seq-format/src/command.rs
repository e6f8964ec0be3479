//! Command wire format
//!
//! Every command flattens to the same eight (or nine) pipe-separated
//! fields; the variant is recovered from which fields carry payload. A
//! `MoveServo` whose uid no longer exists on the vehicle fails to parse,
//! which callers treat as "drop this command".

use seq_actuator::ServoRegistry;
use seq_core::{BuiltinGroup, Command, CommandKind, GroupRef, ServoUid};

use crate::{parse_bool, parse_f32, parse_i32, FormatError, FormatResult};

/// Serialize one command to its pipe-separated form
pub fn serialize_command(cmd: &Command) -> String {
    let (servo, position, speed, wait, wait_time, goto_index, goto_counter, group) = match &cmd.kind
    {
        CommandKind::MoveServo {
            servo,
            target_position,
            speed_multiplier,
        } => (
            Some(*servo),
            *target_position,
            *speed_multiplier,
            false,
            0.0,
            -1,
            -1,
            None,
        ),
        CommandKind::Delay { seconds } => (None, 0.0, 0.0, true, *seconds, -1, -1, None),
        CommandKind::WaitForMoves => (None, 0.0, 0.0, true, 0.0, -1, -1, None),
        CommandKind::WaitForActionGroup { group } => {
            (None, 0.0, 0.0, true, 0.0, -1, -1, Some(*group))
        }
        CommandKind::ToggleActionGroup { group } => {
            (None, 0.0, 0.0, false, 0.0, -1, -1, Some(*group))
        }
        CommandKind::Goto {
            target, counter, ..
        } => (None, 0.0, 0.0, true, 0.0, *target as i32, *counter, None),
    };

    let servo_field = servo
        .map(|uid| uid.to_string())
        .unwrap_or_else(|| "null".to_string());
    let (group_field, extended) = match group {
        Some(GroupRef::Builtin(builtin)) => (builtin.as_i32(), None),
        Some(GroupRef::Extended(id)) => (BuiltinGroup::None.as_i32(), Some(id)),
        None => (BuiltinGroup::None.as_i32(), None),
    };

    let mut out = format!(
        "{servo_field}|{position}|{speed}|{wait}|{wait_time}|{goto_index}|{goto_counter}|{group_field}"
    );
    if let Some(id) = extended {
        out.push('|');
        out.push_str(&id.to_string());
    }
    out
}

/// Parse one command from its pipe-separated form
///
/// `servos` validates `MoveServo` references: a uid absent from the
/// registry is a [`FormatError::MissingServo`].
pub fn parse_command(text: &str, servos: &ServoRegistry) -> FormatResult<Command> {
    let fields: Vec<&str> = text.split('|').collect();
    if fields.len() != 8 && fields.len() != 9 {
        return Err(FormatError::FieldCount(fields.len()));
    }

    let position = parse_f32("position", fields[1])?;
    let speed = parse_f32("speedMultiplier", fields[2])?;
    let wait = parse_bool("wait", fields[3])?;
    let wait_time = parse_f32("waitTime", fields[4])?;
    let goto_index = parse_i32("gotoIndex", fields[5])?;
    let goto_counter = parse_i32("gotoCommandCounter", fields[6])?;
    let group_id = parse_i32("actionGroup", fields[7])?;
    let extended = match fields.get(8) {
        Some(value) => Some(parse_i32("extendedGroupId", value)?),
        None => None,
    };

    let group = match extended {
        Some(id) if id >= 0 => Some(GroupRef::Extended(id)),
        _ => {
            let builtin = BuiltinGroup::from_i32(group_id)
                .map_err(|_| FormatError::UnknownGroup(group_id))?;
            if builtin == BuiltinGroup::None {
                None
            } else {
                Some(GroupRef::Builtin(builtin))
            }
        }
    };

    if fields[0] != "null" {
        let uid: ServoUid = fields[0].parse().map_err(|_| FormatError::InvalidNumber {
            field: "servoUid",
            value: fields[0].to_string(),
        })?;
        if !servos.contains(uid) {
            return Err(FormatError::MissingServo(uid));
        }
        return Ok(Command::move_servo(uid, position, speed));
    }

    if wait {
        if goto_index >= 0 {
            return Ok(Command::goto(goto_index as usize, goto_counter));
        }
        if wait_time > 0.0 {
            return Ok(Command::delay(wait_time));
        }
        if let Some(group) = group {
            return Ok(Command::wait_for_group(group));
        }
        return Ok(Command::wait_for_moves());
    }

    if let Some(group) = group {
        return Ok(Command::toggle_group(group));
    }

    Err(FormatError::UnrecognizedCommand(text.to_string()))
}
