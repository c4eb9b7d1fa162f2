//! Domain Ports - Core trait definitions for the array control plane
//!
//! These traits define the boundaries between the control plane and external
//! systems: the array REST client and the host transport connectors.
//! Adapters implement these traits to provide concrete functionality.

use crate::context::RequestContext;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

// =============================================================================
// Transport Protocol
// =============================================================================

/// Transport protocol a volume is exposed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "iSCSI")]
    Iscsi,
    #[serde(rename = "FC")]
    Fc,
    #[serde(rename = "NFS")]
    Nfs,
    /// Volumes created before the protocol was encoded in the identifier
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Iscsi => "iSCSI",
            Protocol::Fc => "FC",
            Protocol::Nfs => "NFS",
            Protocol::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "iscsi" => Ok(Protocol::Iscsi),
            "fc" => Ok(Protocol::Fc),
            "nfs" => Ok(Protocol::Nfs),
            "unknown" => Ok(Protocol::Unknown),
            _ => Err(format!("unrecognized protocol '{}'", s)),
        }
    }
}

// =============================================================================
// Array Client Port
// =============================================================================

/// Connection parameters used to open an authenticated session
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"*******")
            .finish()
    }
}

/// Why an authentication attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// The array rejected the credentials
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    /// The array could not be reached or answered unexpectedly
    #[error("unreachable: {0}")]
    Unreachable(String),
}

/// Host registration request sent to an array by node-mode drivers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRegistration {
    /// Short host name (first DNS label)
    pub name: String,
    /// Fully qualified node name
    pub long_name: String,
    /// Local iSCSI initiator IQNs
    pub iscsi_initiators: Vec<String>,
    /// Local FC initiator port WWNs
    pub fc_initiators: Vec<String>,
}

/// Port for the array REST client
///
/// A client owns its own session token. It is created once per array per
/// reload generation and never shared across generations.
#[async_trait]
pub trait ArrayClient: Send + Sync {
    /// Open an authenticated session; on success the token is stored
    async fn authenticate(&self, config: &ConnectConfig) -> std::result::Result<(), AuthFailure>;

    /// Current session token, empty when unauthenticated
    fn token(&self) -> String;

    /// Register this host and its initiators with the array
    async fn register_host(&self, ctx: &RequestContext, host: &HostRegistration) -> Result<()>;
}

#[cfg(test)]
impl std::fmt::Debug for dyn ArrayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ArrayClient")
    }
}

/// Port for constructing array clients during a reload
pub trait ArrayClientFactory: Send + Sync {
    /// Build an unauthenticated client for `endpoint`
    fn create(&self, endpoint: &str, insecure: bool) -> Result<Arc<dyn ArrayClient>>;
}

// =============================================================================
// Transport Connector Ports
// =============================================================================

/// Block device attached by a connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Kernel device name (e.g. sdc)
    pub name: String,
    /// Device path (e.g. /dev/sdc)
    pub path: PathBuf,
    /// World wide identifier, when the kernel exposes one
    pub wwn: Option<String>,
}

/// One iSCSI target portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IscsiTargetInfo {
    /// Target IQN
    pub target: String,
    /// Portal address, `ip:port`
    pub portal: String,
}

/// What an iSCSI connector needs to attach a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IscsiVolumeInfo {
    pub targets: Vec<IscsiTargetInfo>,
    pub lun: u32,
}

/// What an FC connector needs to attach a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FcVolumeInfo {
    /// Array target port WWPNs (hex, no `0x` prefix)
    pub target_wwpns: Vec<String>,
    pub lun: u32,
}

/// Port for the iSCSI transport connector
#[async_trait]
pub trait IscsiConnector: Send + Sync {
    async fn connect_volume(&self, ctx: &RequestContext, info: &IscsiVolumeInfo) -> Result<Device>;

    async fn disconnect_volume_by_device_name(&self, ctx: &RequestContext, name: &str) -> Result<()>;

    async fn initiator_names(&self, ctx: &RequestContext) -> Result<Vec<String>>;
}

/// Port for the Fibre Channel transport connector
#[async_trait]
pub trait FcConnector: Send + Sync {
    async fn connect_volume(&self, ctx: &RequestContext, info: &FcVolumeInfo) -> Result<Device>;

    async fn disconnect_volume_by_device_name(&self, ctx: &RequestContext, name: &str) -> Result<()>;

    async fn initiator_ports(&self, ctx: &RequestContext) -> Result<Vec<String>>;
}

/// Logging hook handed to transport connectors
pub trait TransportLogger: Send + Sync {
    fn info(&self, ctx: &RequestContext, msg: &str);
    fn debug(&self, ctx: &RequestContext, msg: &str);
    fn error(&self, ctx: &RequestContext, msg: &str);
}

/// Tracing hook handed to transport connectors
pub trait TransportTracer: Send + Sync {
    fn trace(&self, ctx: &RequestContext, msg: &str);
}

/// Logging and tracing hooks shared by every connector in the process
#[derive(Clone)]
pub struct TransportAdapters {
    pub logger: Arc<dyn TransportLogger>,
    pub tracer: Arc<dyn TransportTracer>,
}

impl std::fmt::Debug for TransportAdapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapters").finish_non_exhaustive()
    }
}

/// Port for building the process-wide connectors
pub trait ConnectorFactory: Send + Sync {
    fn iscsi(&self, chroot: &str, adapters: TransportAdapters) -> Arc<dyn IscsiConnector>;

    fn fc(&self, chroot: &str, adapters: TransportAdapters) -> Arc<dyn FcConnector>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_display() {
        assert_eq!(format!("{}", Protocol::Iscsi), "iSCSI");
        assert_eq!(format!("{}", Protocol::Fc), "FC");
        assert_eq!(format!("{}", Protocol::Nfs), "NFS");
        assert_eq!(format!("{}", Protocol::Unknown), "Unknown");
    }

    #[test]
    fn test_protocol_parse_is_case_insensitive() {
        assert_eq!("iscsi".parse::<Protocol>().unwrap(), Protocol::Iscsi);
        assert_eq!("ISCSI".parse::<Protocol>().unwrap(), Protocol::Iscsi);
        assert_eq!("fc".parse::<Protocol>().unwrap(), Protocol::Fc);
        assert!("nvme".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_connect_config_debug_masks_password() {
        let config = ConnectConfig {
            endpoint: "https://10.0.0.1".into(),
            username: "admin".into(),
            password: "secret".into(),
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("*******"));
    }
}
