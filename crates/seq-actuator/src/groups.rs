//! Action group capabilities
//!
//! Two independent providers: the vehicle's built-in groups, and an
//! optional extended-groups extension. The extension is reached through the
//! `ExtendedGroups` adapter, which probes availability once and fails
//! closed — when the provider is absent every call is a safe no-op.

use std::collections::BTreeMap;
use std::sync::Arc;

use seq_core::BuiltinGroup;
use tracing::{debug, trace};

/// Built-in action group capability
pub trait ActionGroups: Send + Sync {
    /// Toggle a group. Toggling [`BuiltinGroup::None`] is a no-op.
    fn toggle(&self, group: BuiltinGroup);

    /// Read a group's boolean state. [`BuiltinGroup::None`] reads false.
    fn state(&self, group: BuiltinGroup) -> bool;
}

/// Capability surface of the optional extended-groups provider
pub trait ExtendedGroupProvider: Send + Sync {
    /// Toggle a group by extension id
    fn toggle_group(&self, id: i32);

    /// Read a group's boolean state by extension id
    fn group_state(&self, id: i32) -> bool;

    /// Display name for a group id, if assigned
    fn group_name(&self, id: i32) -> Option<String>;

    /// All assigned groups, id to name
    fn assigned_groups(&self) -> BTreeMap<i32, String>;
}

/// Fail-closed adapter over the optional extended-groups provider
///
/// Built once at startup from whatever the host managed to locate; the
/// result is cached for the sequencer's lifetime. All calls degrade to
/// no-ops / empty results when the provider is absent.
pub struct ExtendedGroups {
    provider: Option<Arc<dyn ExtendedGroupProvider>>,
}

impl ExtendedGroups {
    /// Wrap the probe result
    pub fn detect(provider: Option<Arc<dyn ExtendedGroupProvider>>) -> Self {
        match &provider {
            Some(_) => debug!("Extended action groups provider detected"),
            None => debug!("Extended action groups provider not installed"),
        }
        Self { provider }
    }

    /// Adapter for a host without the extension
    pub fn absent() -> Self {
        Self { provider: None }
    }

    /// Whether the provider was found at startup
    pub fn installed(&self) -> bool {
        self.provider.is_some()
    }

    /// Toggle an extended group; ignored when the provider is absent
    pub fn toggle_group(&self, id: i32) {
        match &self.provider {
            Some(provider) => provider.toggle_group(id),
            None => trace!(id, "Extended group toggle ignored, provider absent"),
        }
    }

    /// Read an extended group's state; false when the provider is absent
    pub fn group_state(&self, id: i32) -> bool {
        self.provider
            .as_ref()
            .map(|provider| provider.group_state(id))
            .unwrap_or(false)
    }

    /// Display name for an extended group id
    pub fn group_name(&self, id: i32) -> Option<String> {
        self.provider.as_ref().and_then(|p| p.group_name(id))
    }

    /// All assigned extended groups
    pub fn assigned_groups(&self) -> BTreeMap<i32, String> {
        self.provider
            .as_ref()
            .map(|p| p.assigned_groups())
            .unwrap_or_default()
    }
}

impl Default for ExtendedGroups {
    fn default() -> Self {
        Self::absent()
    }
}
