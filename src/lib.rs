//! CSI Array Plane - Multi-Array Control Plane Core
//!
//! The part of a CSI storage driver that decides which storage array and
//! which transport handle a request, and keeps that decision correct while
//! the array credentials change underneath it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Control Plane Service                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────────┐ │
//! │  │  Credentials     │──▶│  Config          │──▶│  Array Registry      │ │
//! │  │  Watcher (..data)│   │  Synchronizer    │   │  (generation swap)   │ │
//! │  └──────────────────┘   └──────────────────┘   └──────────┬───────────┘ │
//! │                                                           │             │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────┴───────────┐ │
//! │  │  Volume Handle   │   │  Probe Engine    │   │  Node-Info Sync      │ │
//! │  │  Codec           │   │  (fallback)      │   │  (node mode)         │ │
//! │  └──────────────────┘   └──────────────────┘   └──────────────────────┘ │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │        Connector Manager (iSCSI / FC, built once per process)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`array`]: Array descriptors, the registry, probing and the REST client
//! - [`config`]: Driver options, credentials file, reload and watch
//! - [`connector`]: iSCSI/FC transport connectors
//! - [`context`]: Request correlation context and run ids
//! - [`controlplane`]: Service wiring, node-info sync and status API
//! - [`volume`]: Composite volume ids
//! - [`domain`]: Port traits
//! - [`error`]: Error types and status mapping

pub mod array;
pub mod config;
pub mod connector;
pub mod context;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod volume;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use array::{
    ArrayDescriptor, ArrayId, ArrayRegistry, ArrayStatus, Generation, ProbeEngine,
    RegistryEvent, RestArrayClient, RestClientFactory,
};

pub use config::{
    ConfigSynchronizer, ConfigWatcher, DriverArgs, DriverMode, DriverOptions, SyncState,
};

pub use connector::{ConnectorManager, LinuxConnectorFactory, LinuxPaths};

pub use context::{RequestContext, RunIdGenerator, RunScope};

pub use controlplane::{ApiServer, ApiServerConfig, NodeInfoSync, ResolvedVolume, Service};

pub use domain::ports::{
    ArrayClient, ArrayClientFactory, ConnectorFactory, FcConnector, IscsiConnector, Protocol,
};

pub use error::{Error, Result, Status, StatusCode};

pub use metrics::Metrics;

pub use volume::VolumeHandle;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
