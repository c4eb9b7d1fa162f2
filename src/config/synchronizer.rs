//! Configuration Synchronizer
//!
//! Loads the credentials file into the array registry. A reload either
//! installs a complete new generation or leaves the registry exactly as it
//! was; reloads never run concurrently with each other.

use super::credentials::{self, CredentialsFormat};
use super::watcher::{watch_dir_for, DATA_POINTER};
use crate::array::{ArrayDescriptor, ArrayRegistry, RegistryEvent};
use crate::context::RequestContext;
use crate::domain::ports::ArrayClientFactory;
use crate::error::{Error, Result};
use crate::metrics::{Metrics, OUTCOME_FAILURE, OUTCOME_SUCCESS};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, Instrument};

/// Observable synchronizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No generation has been installed yet
    Uninitialized,
    /// A generation is installed; failed reloads never leave this state
    Loaded { generation: u64 },
}

/// Keeps the array registry in step with the credentials file
pub struct ConfigSynchronizer {
    path: PathBuf,
    registry: Arc<ArrayRegistry>,
    client_factory: Arc<dyn ArrayClientFactory>,
    metrics: Arc<Metrics>,
    /// Held for the whole body of a reload
    reload_lock: Mutex<()>,
}

impl ConfigSynchronizer {
    pub fn new(
        path: impl Into<PathBuf>,
        registry: Arc<ArrayRegistry>,
        client_factory: Arc<dyn ArrayClientFactory>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            registry,
            client_factory,
            metrics,
            reload_lock: Mutex::new(()),
        })
    }

    /// Path of the credentials file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &Arc<ArrayRegistry> {
        &self.registry
    }

    pub fn state(&self) -> SyncState {
        match self.registry.generation() {
            0 => SyncState::Uninitialized,
            generation => SyncState::Loaded { generation },
        }
    }

    /// Absolute directory containing the credentials file
    pub fn watch_dir(&self) -> PathBuf {
        let parent = watch_dir_for(&self.path);
        if parent.is_absolute() {
            parent
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&parent))
                .unwrap_or(parent)
        }
    }

    /// Sentinel path swapped by the orchestrator when the secret changes
    pub fn data_path(&self) -> PathBuf {
        self.watch_dir().join(DATA_POINTER)
    }

    /// Read, validate and install the credentials file.
    ///
    /// Returns the installed generation number. On error the previous
    /// generation stays in effect.
    pub async fn reload(&self, ctx: &RequestContext) -> Result<u64> {
        async move {
            info!(path = %self.path.display(), "synchronizing driver config");
            let _guard = self.reload_lock.lock().await;

            match self.load_generation().await {
                Ok((generation, array_count)) => {
                    self.metrics.record_reload(OUTCOME_SUCCESS);
                    self.metrics.record_generation(generation, array_count);
                    info!(generation, arrays = array_count, "driver config installed");
                    Ok(generation)
                }
                Err(e) => {
                    self.metrics.record_reload(OUTCOME_FAILURE);
                    error!(
                        error = %e,
                        arrays = self.registry.count(),
                        "invalid driver configuration, keeping previous generation"
                    );
                    self.registry.publish(RegistryEvent::ReloadFailed {
                        generation: self.registry.generation(),
                        reason: e.to_string(),
                    });
                    Err(e)
                }
            }
        }
        .instrument(ctx.span())
        .await
    }

    async fn load_generation(&self) -> Result<(u64, usize)> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|source| Error::ConfigIo {
                path: self.path.display().to_string(),
                source,
            })?;

        let entries = credentials::parse(&content, CredentialsFormat::from_path(&self.path))?
            .validate()?;

        let mut descriptors = Vec::with_capacity(entries.len());
        for entry in entries {
            let client = self
                .client_factory
                .create(&entry.rest_gateway, entry.insecure)
                .map_err(|e| Error::ConfigClientInit {
                    array_id: entry.array_id.clone(),
                    reason: e.to_string(),
                })?;

            info!(
                array_id = %entry.array_id,
                rest_gateway = %entry.rest_gateway,
                username = %entry.username,
                password = "*******",
                insecure = entry.insecure,
                is_default_array = entry.is_default_array,
                "configured array"
            );
            descriptors.push(ArrayDescriptor::new(entry, client));
        }

        let array_count = descriptors.len();
        let generation = self.registry.replace_all(descriptors)?;
        Ok((generation, array_count))
    }
}

impl std::fmt::Debug for ConfigSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSynchronizer")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}
