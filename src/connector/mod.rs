//! Transport Connectors
//!
//! Process-wide iSCSI and FC connectors, the adapters that route their
//! logging into `tracing`, and the Linux implementations.

pub mod adapters;
pub mod lifecycle;
pub mod linux;

pub use adapters::{tracing_adapters, TracingTransportLogger, TracingTransportTracer};
pub use lifecycle::ConnectorManager;
pub use linux::{LinuxConnectorFactory, LinuxFcConnector, LinuxIscsiConnector, LinuxPaths};
