//! Action group references
//!
//! Commands can toggle or wait on boolean action groups. Groups come from
//! two providers: the vehicle's built-in groups (a fixed enum) and an
//! optional extended-groups extension addressed by numeric id.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for group conversions
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("unknown built-in action group id: {0}")]
    UnknownBuiltin(i32),
}

/// Built-in vehicle action groups
///
/// `None` is a sentinel meaning "no group assigned"; toggling it is a no-op
/// and its state always reads false. The wire format stores the numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum BuiltinGroup {
    None = 0,
    Stage = 1,
    Gear = 2,
    Lights = 3,
    Brakes = 4,
    Rcs = 5,
    Sas = 6,
    Abort = 7,
    Custom01 = 8,
    Custom02 = 9,
    Custom03 = 10,
    Custom04 = 11,
    Custom05 = 12,
    Custom06 = 13,
    Custom07 = 14,
    Custom08 = 15,
    Custom09 = 16,
    Custom10 = 17,
}

impl BuiltinGroup {
    /// Numeric id used by the persisted text format
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Parse a persisted numeric id
    pub fn from_i32(value: i32) -> Result<Self, GroupError> {
        use BuiltinGroup::*;
        Ok(match value {
            0 => None,
            1 => Stage,
            2 => Gear,
            3 => Lights,
            4 => Brakes,
            5 => Rcs,
            6 => Sas,
            7 => Abort,
            8 => Custom01,
            9 => Custom02,
            10 => Custom03,
            11 => Custom04,
            12 => Custom05,
            13 => Custom06,
            14 => Custom07,
            15 => Custom08,
            16 => Custom09,
            17 => Custom10,
            other => return Err(GroupError::UnknownBuiltin(other)),
        })
    }
}

impl Default for BuiltinGroup {
    fn default() -> Self {
        BuiltinGroup::None
    }
}

/// Reference to an action group from either provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRef {
    /// A built-in vehicle group
    Builtin(BuiltinGroup),
    /// A group id owned by the optional extended-groups provider
    Extended(i32),
}

impl GroupRef {
    /// True for the "no group" sentinel
    pub fn is_none(&self) -> bool {
        matches!(self, GroupRef::Builtin(BuiltinGroup::None))
    }
}

impl Default for GroupRef {
    fn default() -> Self {
        GroupRef::Builtin(BuiltinGroup::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_group_id_roundtrip() {
        for id in 0..=17 {
            let group = BuiltinGroup::from_i32(id).unwrap();
            assert_eq!(group.as_i32(), id);
        }
    }

    #[test]
    fn test_unknown_builtin_id() {
        assert_eq!(
            BuiltinGroup::from_i32(99),
            Err(GroupError::UnknownBuiltin(99))
        );
    }

    #[test]
    fn test_group_ref_none_sentinel() {
        assert!(GroupRef::Builtin(BuiltinGroup::None).is_none());
        assert!(!GroupRef::Builtin(BuiltinGroup::Gear).is_none());
        assert!(!GroupRef::Extended(0).is_none());
    }
}
