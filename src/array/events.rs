//! Registry Events
//!
//! Events emitted by the array registry for external consumers to react to
//! generation swaps and array status changes.

use serde::{Deserialize, Serialize};

/// Events emitted by the array registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A new generation was installed
    GenerationInstalled {
        generation: u64,
        array_count: usize,
        default_array: Option<String>,
    },

    /// A reload failed; the previous generation stays in effect
    ReloadFailed { generation: u64, reason: String },

    /// An array's probe status flipped
    ProbeStatusChanged { array_id: String, succeeded: bool },

    /// An array's host registration status flipped
    HostRegistrationChanged { array_id: String, registered: bool },
}

impl RegistryEvent {
    /// Get the array ID associated with this event, if any
    pub fn array_id(&self) -> Option<&str> {
        match self {
            RegistryEvent::ProbeStatusChanged { array_id, .. } => Some(array_id),
            RegistryEvent::HostRegistrationChanged { array_id, .. } => Some(array_id),
            _ => None,
        }
    }

    /// Check if this is a generation-level event
    pub fn is_generation_event(&self) -> bool {
        matches!(
            self,
            RegistryEvent::GenerationInstalled { .. } | RegistryEvent::ReloadFailed { .. }
        )
    }
}
