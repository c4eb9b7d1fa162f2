//! Control Plane Service
//!
//! Owns every core component and wires them together at startup: the first
//! credentials load, the credentials watcher and, in node mode, the
//! node-info sync. Request paths go through this type to resolve arrays,
//! volumes and connectors.

use super::node_sync::{node_sync_channel, NodeInfoSync};
use crate::array::{ArrayDescriptor, ArrayRegistry, ProbeEngine};
use crate::config::{ConfigSynchronizer, ConfigWatcher, DriverOptions};
use crate::connector::ConnectorManager;
use crate::context::{RequestContext, RunIdGenerator, RunScope};
use crate::domain::ports::{
    ArrayClient, ArrayClientFactory, ConnectorFactory, FcConnector, IscsiConnector,
};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::volume::VolumeHandle;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// Run id used for the startup sequence
pub const STARTUP_RUN_ID: &str = "start";

/// A volume id resolved against one registry generation
#[derive(Debug, Clone)]
pub struct ResolvedVolume {
    pub handle: VolumeHandle,
    pub array: Arc<ArrayDescriptor>,
}

/// Serializable form of [`ResolvedVolume`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedVolumeInfo {
    pub volume_id: String,
    pub native_id: String,
    pub protocol: String,
    pub array_id: String,
    pub legacy: bool,
}

impl From<&ResolvedVolume> for ResolvedVolumeInfo {
    fn from(v: &ResolvedVolume) -> Self {
        Self {
            volume_id: v.handle.to_string(),
            native_id: v.handle.native_id().to_string(),
            protocol: v.handle.protocol_token().to_string(),
            array_id: v.array.id().to_string(),
            legacy: v.handle.is_legacy(),
        }
    }
}

pub struct Service {
    options: DriverOptions,
    registry: Arc<ArrayRegistry>,
    synchronizer: Arc<ConfigSynchronizer>,
    probe: Arc<ProbeEngine>,
    connectors: Arc<ConnectorManager>,
    run_ids: Arc<RunIdGenerator>,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Service {
    pub fn new(
        options: DriverOptions,
        client_factory: Arc<dyn ArrayClientFactory>,
        connector_factory: Arc<dyn ConnectorFactory>,
    ) -> Result<Arc<Self>> {
        let metrics = Metrics::new()?;
        let registry = ArrayRegistry::new();
        let synchronizer = ConfigSynchronizer::new(
            options.driver_config.clone(),
            registry.clone(),
            client_factory,
            metrics.clone(),
        );
        let probe = Arc::new(ProbeEngine::new(registry.clone(), metrics.clone(), options.auto_probe));

        Ok(Arc::new(Self {
            options,
            registry,
            synchronizer,
            probe,
            connectors: Arc::new(ConnectorManager::new(connector_factory)),
            run_ids: RunIdGenerator::new(),
            metrics,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Load the credentials and start background tasks.
    ///
    /// A failed first load aborts startup; a watcher that cannot be set up
    /// is logged and the driver runs on the loaded configuration.
    pub async fn start(&self) -> Result<()> {
        let ctx = RequestContext::new().with_run_id(STARTUP_RUN_ID);
        async {
            info!(
                mode = %self.options.mode,
                node_name = %self.options.node_name,
                auto_probe = self.options.auto_probe,
                "starting array control plane"
            );
            if self.options.is_node_mode() && self.options.node_name.is_empty() {
                return Err(Error::Configuration(
                    "'Node Name' has not been configured. Set environment variable X_CSI_NODENAME"
                        .to_string(),
                ));
            }
            Ok(())
        }
        .instrument(ctx.span())
        .await?;

        let config_ctx = self.run_ids.scoped(&ctx, RunScope::Config);
        self.synchronizer.reload(&config_ctx).await?;

        let mut watcher = ConfigWatcher::new(
            self.synchronizer.clone(),
            self.run_ids.clone(),
            self.shutdown.child_token(),
        );

        if self.options.is_node_mode() {
            let (trigger, rx) = node_sync_channel();
            let sync = Arc::new(NodeInfoSync::new(
                &self.options,
                self.registry.clone(),
                self.probe.clone(),
                self.connectors.clone(),
                self.run_ids.clone(),
                self.metrics.clone(),
            ));
            self.tasks
                .lock()
                .push(sync.spawn(ctx.clone(), rx, self.shutdown.child_token()));
            trigger.signal();
            watcher = watcher.with_node_sync(trigger);
        }

        match watcher.spawn(&config_ctx) {
            Ok(handle) => self.tasks.lock().push(handle),
            Err(e) => {
                let _span = config_ctx.span().entered();
                error!(error = %e, "unable to watch driver config, hot reload disabled");
            }
        }
        Ok(())
    }

    /// Stop background tasks and wait for them to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "background task failed");
            }
        }
        info!("array control plane stopped");
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Correlation context for an inbound request
    pub fn incoming_context(&self, metadata: &HashMap<String, String>) -> RequestContext {
        self.run_ids.incoming(metadata)
    }

    /// Whether the first credentials load has completed
    pub fn is_ready(&self) -> bool {
        self.registry.is_loaded()
    }

    /// Client of a configured array
    pub fn array_client(&self, ctx: &RequestContext, array_id: &str) -> Result<Arc<dyn ArrayClient>> {
        let generation = self.registry.snapshot();
        if generation.is_empty() {
            return Err(Error::NoArraysConfigured);
        }
        let array = generation.get(&array_id.into()).ok_or_else(|| Error::ArrayNotFound {
            array_id: array_id.to_lowercase(),
        })?;
        let _span = ctx.span().entered();
        debug!(array_id = %array.id(), "resolved array client");
        Ok(array.client().clone())
    }

    /// Resolve a volume id to its array, protocol and native id
    pub fn resolve_volume(&self, ctx: &RequestContext, raw: &str) -> Result<ResolvedVolume> {
        let generation = self.registry.snapshot();
        if generation.is_empty() {
            return Err(Error::NoArraysConfigured);
        }
        let handle = VolumeHandle::decode(raw, &generation)?;
        let array = generation
            .get(handle.array_id())
            .cloned()
            .ok_or_else(|| Error::ArrayNotFound {
                array_id: handle.array_id().to_string(),
            })?;

        let _span = ctx.with_array_id(array.id().as_str()).span().entered();
        debug!(
            native_id = handle.native_id(),
            protocol = handle.protocol_token(),
            "resolved volume"
        );
        Ok(ResolvedVolume { handle, array })
    }

    pub async fn probe(&self, ctx: &RequestContext, array_id: Option<&str>) -> Result<()> {
        self.probe.probe(ctx, array_id).await
    }

    pub async fn require_probe(&self, ctx: &RequestContext, array_id: Option<&str>) -> Result<()> {
        self.probe.require_probe(ctx, array_id).await
    }

    pub fn iscsi_connector(&self) -> Arc<dyn IscsiConnector> {
        self.connectors.iscsi_connector(&self.options.chroot)
    }

    pub fn fc_connector(&self) -> Arc<dyn FcConnector> {
        self.connectors.fc_connector(&self.options.chroot)
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<ArrayRegistry> {
        &self.registry
    }

    pub fn synchronizer(&self) -> &Arc<ConfigSynchronizer> {
        &self.synchronizer
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("mode", &self.options.mode)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
