//! Array Management
//!
//! Configured arrays, the generation-swapping registry that holds them,
//! the probe engine that authenticates them, and the REST client used to
//! talk to them.

pub mod client;
pub mod descriptor;
pub mod events;
pub mod probe;
pub mod registry;

pub use client::{RestArrayClient, RestClientFactory};
pub use descriptor::{ArrayDescriptor, ArrayId, ArrayStatus};
pub use events::RegistryEvent;
pub use probe::ProbeEngine;
pub use registry::{ArrayRegistry, Generation};
