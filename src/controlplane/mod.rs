//! Control Plane Module
//!
//! The service that ties the array registry, credentials reloads, probing
//! and connectors together, plus its status API and node-info sync.

pub mod api;
pub mod node_sync;
pub mod service;

pub use api::*;
pub use node_sync::{node_sync_channel, NodeInfoSync, NodeSyncTrigger, SyncSummary};
pub use service::{ResolvedVolume, ResolvedVolumeInfo, Service, STARTUP_RUN_ID};
