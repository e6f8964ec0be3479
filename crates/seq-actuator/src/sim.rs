//! Simulated actuators
//!
//! Plant models for the simulator binary and the engine's integration
//! tests: a rate-limited servo advanced explicitly between ticks, and
//! boolean action group providers backed by in-memory maps.

use std::collections::BTreeMap;
use std::sync::Mutex;

use dashmap::DashMap;
use seq_core::{BuiltinGroup, ServoUid};
use tracing::trace;

use crate::{ActionGroups, ExtendedGroupProvider, ServoActuator};

#[derive(Debug, Clone, Copy)]
struct Motion {
    position: f32,
    target: Option<f32>,
    speed: f32,
}

/// A simulated servo that moves toward its target at a fixed rate
///
/// The sequencer never drives motion itself; the host advances the plant
/// between ticks by calling [`SimServo::advance`] with the elapsed time.
pub struct SimServo {
    uid: ServoUid,
    name: String,
    min_position: f32,
    max_position: f32,
    /// Travel rate in position units per second at speed multiplier 1.0
    rate: f32,
    motion: Mutex<Motion>,
}

impl SimServo {
    /// Create a servo resting at the midpoint of its travel range
    pub fn new(
        uid: ServoUid,
        name: impl Into<String>,
        min_position: f32,
        max_position: f32,
        rate: f32,
    ) -> Self {
        Self {
            uid,
            name: name.into(),
            min_position,
            max_position,
            rate,
            motion: Mutex::new(Motion {
                position: (min_position + max_position) / 2.0,
                target: None,
                speed: 1.0,
            }),
        }
    }

    /// Place the servo at an exact position, aborting any move
    pub fn set_position(&self, position: f32) {
        let mut motion = self.motion.lock().unwrap();
        motion.position = position.clamp(self.min_position, self.max_position);
        motion.target = None;
    }

    /// Advance the plant by `dt` seconds of simulated time
    pub fn advance(&self, dt: f32) {
        let mut motion = self.motion.lock().unwrap();
        let Some(target) = motion.target else {
            return;
        };

        let step = self.rate * motion.speed.max(0.0) * dt;
        let delta = target - motion.position;
        if delta.abs() <= step {
            motion.position = target;
            motion.target = None;
        } else {
            motion.position += step * delta.signum();
        }
        motion.position = motion.position.clamp(self.min_position, self.max_position);
    }

    /// Whether a move is still in flight
    pub fn is_moving(&self) -> bool {
        self.motion.lock().unwrap().target.is_some()
    }
}

impl ServoActuator for SimServo {
    fn uid(&self) -> ServoUid {
        self.uid
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn position(&self) -> f32 {
        self.motion.lock().unwrap().position
    }

    fn min_position(&self) -> f32 {
        self.min_position
    }

    fn max_position(&self) -> f32 {
        self.max_position
    }

    fn move_to(&self, target_position: f32, speed: f32) {
        let clamped = target_position.clamp(self.min_position, self.max_position);
        trace!(uid = %self.uid, target = clamped, speed, "SimServo move_to");
        let mut motion = self.motion.lock().unwrap();
        motion.target = Some(clamped);
        motion.speed = speed;
    }

    fn stop(&self) {
        trace!(uid = %self.uid, "SimServo stop");
        self.motion.lock().unwrap().target = None;
    }
}

/// In-memory built-in action groups
#[derive(Default)]
pub struct SimActionGroups {
    states: DashMap<BuiltinGroup, bool>,
}

impl SimActionGroups {
    /// Create with all groups off
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a group to a state (test/setup helper)
    pub fn set(&self, group: BuiltinGroup, value: bool) {
        if group != BuiltinGroup::None {
            self.states.insert(group, value);
        }
    }
}

impl ActionGroups for SimActionGroups {
    fn toggle(&self, group: BuiltinGroup) {
        if group == BuiltinGroup::None {
            return;
        }
        let mut entry = self.states.entry(group).or_insert(false);
        *entry = !*entry;
    }

    fn state(&self, group: BuiltinGroup) -> bool {
        if group == BuiltinGroup::None {
            return false;
        }
        self.states.get(&group).map(|v| *v).unwrap_or(false)
    }
}

/// In-memory extended-groups provider
#[derive(Default)]
pub struct SimExtendedGroups {
    groups: DashMap<i32, (String, bool)>,
}

impl SimExtendedGroups {
    /// Create with no groups assigned
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a group id a name, starting in the off state
    pub fn assign(&self, id: i32, name: impl Into<String>) {
        self.groups.insert(id, (name.into(), false));
    }
}

impl ExtendedGroupProvider for SimExtendedGroups {
    fn toggle_group(&self, id: i32) {
        if let Some(mut entry) = self.groups.get_mut(&id) {
            entry.1 = !entry.1;
        }
    }

    fn group_state(&self, id: i32) -> bool {
        self.groups.get(&id).map(|entry| entry.1).unwrap_or(false)
    }

    fn group_name(&self, id: i32) -> Option<String> {
        self.groups.get(&id).map(|entry| entry.0.clone())
    }

    fn assigned_groups(&self) -> BTreeMap<i32, String> {
        self.groups
            .iter()
            .map(|entry| (*entry.key(), entry.value().0.clone()))
            .collect()
    }
}
