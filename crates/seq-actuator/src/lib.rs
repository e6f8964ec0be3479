//! Actuator boundary for the servo sequencer
//!
//! This crate defines the capability surfaces the engine consumes — servos
//! and action groups — plus a registry for looking servos up by uid and
//! simulated implementations used by the simulator and tests. The engine
//! never talks to a concrete vehicle; everything goes through these traits.

mod groups;
mod servo;
mod sim;

pub use groups::{ActionGroups, ExtendedGroupProvider, ExtendedGroups};
pub use servo::{ServoActuator, ServoRegistry};
pub use sim::{SimActionGroups, SimExtendedGroups, SimServo};
