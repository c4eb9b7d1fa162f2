//! Array Descriptor
//!
//! One configured storage array: its connection parameters, fixed once the
//! credentials entry has been validated, plus a few best-effort runtime
//! status bits.

use crate::config::credentials::ArrayEntry;
use crate::domain::ports::{ArrayClient, ConnectConfig};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Array ID
// =============================================================================

/// Case-normalized array identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArrayId(String);

impl ArrayId {
    /// Create an array id, lowercasing the input
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArrayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ArrayId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ArrayId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&String> for ArrayId {
    fn from(s: &String) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// Array Descriptor
// =============================================================================

/// A configured array belonging to one registry generation
pub struct ArrayDescriptor {
    id: ArrayId,
    username: String,
    password: String,
    endpoint: String,
    insecure: bool,
    is_default: bool,
    /// Written only by the probe engine
    probe_succeeded: AtomicBool,
    /// Written only by the node-info sync
    host_registered: AtomicBool,
    client: Arc<dyn ArrayClient>,
}

impl ArrayDescriptor {
    /// Build a descriptor from a validated credentials entry and its client
    pub fn new(entry: ArrayEntry, client: Arc<dyn ArrayClient>) -> Self {
        Self {
            id: ArrayId::new(&entry.array_id),
            username: entry.username,
            password: entry.password,
            endpoint: entry.rest_gateway,
            insecure: entry.insecure,
            is_default: entry.is_default_array,
            probe_succeeded: AtomicBool::new(false),
            host_registered: AtomicBool::new(false),
            client,
        }
    }

    pub fn id(&self) -> &ArrayId {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn client(&self) -> &Arc<dyn ArrayClient> {
        &self.client
    }

    /// Session parameters for authenticating this array's client
    pub fn connect_config(&self) -> ConnectConfig {
        ConnectConfig {
            endpoint: self.endpoint.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn probe_succeeded(&self) -> bool {
        self.probe_succeeded.load(Ordering::Acquire)
    }

    /// Record a probe outcome, returning the previous value
    pub fn set_probe_succeeded(&self, succeeded: bool) -> bool {
        self.probe_succeeded.swap(succeeded, Ordering::AcqRel)
    }

    pub fn host_registered(&self) -> bool {
        self.host_registered.load(Ordering::Acquire)
    }

    /// Record a host registration outcome, returning the previous value
    pub fn set_host_registered(&self, registered: bool) -> bool {
        self.host_registered.swap(registered, Ordering::AcqRel)
    }

    /// Whether the client currently holds a session token
    pub fn has_token(&self) -> bool {
        !self.client.token().is_empty()
    }

    /// Point-in-time status for reporting
    pub fn status(&self) -> ArrayStatus {
        ArrayStatus {
            array_id: self.id.to_string(),
            username: self.username.clone(),
            endpoint: self.endpoint.clone(),
            insecure: self.insecure,
            is_default: self.is_default,
            authenticated: self.has_token(),
            probe_succeeded: self.probe_succeeded(),
            host_registered: self.host_registered(),
        }
    }
}

impl std::fmt::Display for ArrayDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ArrayID: {}, Username: {}, RestGateway: {}, Insecure: {}, IsDefaultArray: {}, IsProbeSuccess: {}, IsHostAdded: {}",
            self.id,
            self.username,
            self.endpoint,
            self.insecure,
            self.is_default,
            self.probe_succeeded(),
            self.host_registered()
        )
    }
}

impl std::fmt::Debug for ArrayDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayDescriptor")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"*******")
            .field("endpoint", &self.endpoint)
            .field("insecure", &self.insecure)
            .field("is_default", &self.is_default)
            .field("probe_succeeded", &self.probe_succeeded())
            .field("host_registered", &self.host_registered())
            .finish()
    }
}

/// Serializable snapshot of a descriptor, without secrets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayStatus {
    pub array_id: String,
    pub username: String,
    pub endpoint: String,
    pub insecure: bool,
    pub is_default: bool,
    pub authenticated: bool,
    pub probe_succeeded: bool,
    pub host_registered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{entry, MockClient};

    #[test]
    fn test_array_id_is_lowercased() {
        assert_eq!(ArrayId::new("APM00123"), ArrayId::new("apm00123"));
        assert_eq!(ArrayId::from("APM00123").as_str(), "apm00123");
    }

    #[test]
    fn test_descriptor_from_entry() {
        let descriptor = ArrayDescriptor::new(entry("APM001", true), MockClient::healthy());

        assert_eq!(descriptor.id().as_str(), "apm001");
        assert!(descriptor.is_default());
        assert!(!descriptor.probe_succeeded());
        assert!(!descriptor.has_token());
        assert_eq!(descriptor.connect_config().password, "password");
    }

    #[test]
    fn test_display_and_debug_hide_password() {
        let descriptor = ArrayDescriptor::new(entry("apm001", false), MockClient::healthy());

        assert!(!descriptor.to_string().contains("password"));
        assert!(!format!("{:?}", descriptor).contains("\"password\""));
        assert!(descriptor.to_string().contains("ArrayID: apm001"));
    }

    #[test]
    fn test_status_flags() {
        let descriptor = ArrayDescriptor::new(entry("apm001", false), MockClient::healthy());

        assert!(!descriptor.set_probe_succeeded(true));
        assert!(!descriptor.set_host_registered(true));

        let status = descriptor.status();
        assert!(status.probe_succeeded);
        assert!(status.host_registered);
        assert_eq!(status.array_id, "apm001");
    }
}
