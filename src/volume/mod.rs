//! Volume identifiers

pub mod handle;

pub use handle::{ParsedId, VolumeHandle};
