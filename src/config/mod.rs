//! Driver Configuration
//!
//! Environment-driven driver options, the mounted credentials file, and the
//! machinery that keeps the array registry in step with that file.

pub mod credentials;
pub mod options;
pub mod synchronizer;
pub mod watcher;

pub use credentials::{ArrayEntry, CredentialsFile, CredentialsFormat};
pub use options::{DriverArgs, DriverMode, DriverOptions};
pub use synchronizer::{ConfigSynchronizer, SyncState};
pub use watcher::{ConfigWatcher, ReloadTrigger, DATA_POINTER};
