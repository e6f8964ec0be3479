//! Servo capability and registry

use std::sync::Arc;

use dashmap::DashMap;
use seq_core::ServoUid;
use tracing::debug;

/// The capability surface a servo exposes to the engine
///
/// Implementations use interior mutability; the engine shares servos as
/// `Arc<dyn ServoActuator>` and calls through `&self`.
pub trait ServoActuator: Send + Sync {
    /// Stable identity for persistence
    fn uid(&self) -> ServoUid;

    /// Display name
    fn name(&self) -> String;

    /// Current position
    fn position(&self) -> f32;

    /// Lower travel limit
    fn min_position(&self) -> f32;

    /// Upper travel limit
    fn max_position(&self) -> f32;

    /// Begin moving toward `target_position` at `speed` (a multiplier on
    /// the servo's own rate). Completion is observed by polling `position`.
    fn move_to(&self, target_position: f32, speed: f32);

    /// Abort any in-flight move, holding the current position
    fn stop(&self);
}

/// Registry of the owning vehicle's servos, keyed by uid
///
/// Servos are stored as `Arc<dyn ServoActuator>` to avoid cloning on reads.
#[derive(Default)]
pub struct ServoRegistry {
    by_uid: DashMap<ServoUid, Arc<dyn ServoActuator>>,
}

impl ServoRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            by_uid: DashMap::new(),
        }
    }

    /// Register a servo, replacing any previous entry with the same uid
    pub fn register(&self, servo: Arc<dyn ServoActuator>) {
        debug!(uid = %servo.uid(), name = %servo.name(), "Registering servo");
        self.by_uid.insert(servo.uid(), servo);
    }

    /// Remove a servo, returning it if present
    pub fn unregister(&self, uid: ServoUid) -> Option<Arc<dyn ServoActuator>> {
        self.by_uid.remove(&uid).map(|(_, servo)| servo)
    }

    /// Look a servo up by uid
    pub fn get(&self, uid: ServoUid) -> Option<Arc<dyn ServoActuator>> {
        self.by_uid.get(&uid).map(|entry| entry.clone())
    }

    /// Whether a servo with this uid exists
    pub fn contains(&self, uid: ServoUid) -> bool {
        self.by_uid.contains_key(&uid)
    }

    /// All registered uids
    pub fn uids(&self) -> Vec<ServoUid> {
        self.by_uid.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of registered servos
    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}
