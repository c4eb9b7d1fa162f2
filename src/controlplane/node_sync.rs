//! Node-Info Sync
//!
//! In node mode the driver registers its host and local initiators with
//! every configured array. A sync runs whenever it is signalled (startup,
//! after each credentials reload) and on a fixed interval for as long as
//! some array still lacks the registration.

use crate::array::{ArrayDescriptor, ArrayRegistry, ProbeEngine, RegistryEvent};
use crate::config::DriverOptions;
use crate::connector::ConnectorManager;
use crate::context::{RequestContext, RunIdGenerator, RunScope};
use crate::domain::ports::HostRegistration;
use crate::error::Result;
use crate::metrics::{Metrics, OUTCOME_FAILURE, OUTCOME_SUCCESS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Requests a node-info sync; a pending request absorbs new ones
#[derive(Debug, Clone)]
pub struct NodeSyncTrigger {
    tx: mpsc::Sender<()>,
}

impl NodeSyncTrigger {
    pub fn signal(&self) {
        let _ = self.tx.try_send(());
    }
}

pub fn node_sync_channel() -> (NodeSyncTrigger, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (NodeSyncTrigger { tx }, rx)
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub registered: usize,
    pub failed: usize,
}

pub struct NodeInfoSync {
    registry: Arc<ArrayRegistry>,
    probe: Arc<ProbeEngine>,
    connectors: Arc<ConnectorManager>,
    run_ids: Arc<RunIdGenerator>,
    metrics: Arc<Metrics>,
    node_name: String,
    long_node_name: String,
    chroot: String,
    interval: Duration,
}

impl NodeInfoSync {
    pub fn new(
        options: &DriverOptions,
        registry: Arc<ArrayRegistry>,
        probe: Arc<ProbeEngine>,
        connectors: Arc<ConnectorManager>,
        run_ids: Arc<RunIdGenerator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            probe,
            connectors,
            run_ids,
            metrics,
            node_name: options.node_name.clone(),
            long_node_name: options.long_node_name.clone(),
            chroot: options.chroot.clone(),
            interval: options.sync_node_info_interval,
        }
    }

    /// Whether some array of the current generation lacks a registration
    pub fn needs_resync(&self) -> bool {
        self.registry.list().iter().any(|a| !a.host_registered())
    }

    async fn host_registration(&self, ctx: &RequestContext) -> HostRegistration {
        let iscsi = self.connectors.iscsi_connector(&self.chroot);
        let fc = self.connectors.fc_connector(&self.chroot);
        let (iqns, wwns) = futures::join!(iscsi.initiator_names(ctx), fc.initiator_ports(ctx));

        let iscsi_initiators = iqns.unwrap_or_else(|e| {
            warn!(error = %e, "unable to read iSCSI initiators");
            Vec::new()
        });
        let fc_initiators = wwns.unwrap_or_else(|e| {
            warn!(error = %e, "unable to read FC initiators");
            Vec::new()
        });

        HostRegistration {
            name: self.node_name.clone(),
            long_name: self.long_node_name.clone(),
            iscsi_initiators,
            fc_initiators,
        }
    }

    async fn register(&self, ctx: &RequestContext, array: &ArrayDescriptor, host: &HostRegistration) -> Result<()> {
        self.probe.probe_one(ctx, array).await?;
        array.client().register_host(ctx, host).await
    }

    fn record(&self, array: &ArrayDescriptor, registered: bool) {
        if array.set_host_registered(registered) != registered {
            self.registry.publish(RegistryEvent::HostRegistrationChanged {
                array_id: array.id().to_string(),
                registered,
            });
        }
    }

    /// Register this host with every array of the current generation
    pub async fn sync_once(&self, ctx: &RequestContext) -> SyncSummary {
        async move {
            info!(node = %self.node_name, "syncing node info");
            let host = self.host_registration(ctx).await;
            debug!(
                iscsi = host.iscsi_initiators.len(),
                fc = host.fc_initiators.len(),
                "local initiators"
            );

            let mut summary = SyncSummary::default();
            for array in self.registry.list() {
                let array_ctx = ctx.with_array_id(array.id().as_str());
                match self.register(&array_ctx, &array, &host).await {
                    Ok(()) => {
                        self.record(&array, true);
                        summary.registered += 1;
                    }
                    Err(e) => {
                        self.record(&array, false);
                        summary.failed += 1;
                        let _span = array_ctx.span().entered();
                        error!(error = %e, "host registration failed");
                    }
                }
            }

            let outcome = if summary.failed == 0 { OUTCOME_SUCCESS } else { OUTCOME_FAILURE };
            self.metrics.record_node_sync(outcome);
            info!(registered = summary.registered, failed = summary.failed, "node info sync finished");
            summary
        }
        .instrument(ctx.span())
        .await
    }

    /// Run syncs on signal and on the resync interval until shutdown
    pub fn spawn(
        self: Arc<Self>,
        parent: RequestContext,
        mut rx: mpsc::Receiver<()>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("node info sync stopping");
                        break;
                    }
                    request = rx.recv() => match request {
                        Some(()) => {
                            let ctx = self.run_ids.scoped(&parent, RunScope::Node);
                            self.sync_once(&ctx).await;
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if self.needs_resync() {
                            let ctx = self.run_ids.scoped(&parent, RunScope::Node);
                            self.sync_once(&ctx).await;
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for NodeInfoSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInfoSync")
            .field("node_name", &self.node_name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
