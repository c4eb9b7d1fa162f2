//! Connector Lifecycle
//!
//! The iSCSI and FC connectors are process-wide singletons built on first
//! use. Transport adapters are installed exactly once, by whichever
//! connector is built first.

use crate::domain::ports::{
    ConnectorFactory, FcConnector, IscsiConnector, TransportAdapters,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

pub struct ConnectorManager {
    factory: Arc<dyn ConnectorFactory>,
    adapter_source: Box<dyn Fn() -> TransportAdapters + Send + Sync>,
    adapters: OnceLock<TransportAdapters>,
    adapter_installs: AtomicUsize,
    iscsi: OnceLock<(String, Arc<dyn IscsiConnector>)>,
    fc: OnceLock<(String, Arc<dyn FcConnector>)>,
}

impl ConnectorManager {
    /// Manager whose connectors log through the `tracing` subscriber
    pub fn new(factory: Arc<dyn ConnectorFactory>) -> Self {
        Self::with_adapters(factory, super::adapters::tracing_adapters)
    }

    pub fn with_adapters(
        factory: Arc<dyn ConnectorFactory>,
        adapter_source: impl Fn() -> TransportAdapters + Send + Sync + 'static,
    ) -> Self {
        Self {
            factory,
            adapter_source: Box::new(adapter_source),
            adapters: OnceLock::new(),
            adapter_installs: AtomicUsize::new(0),
            iscsi: OnceLock::new(),
            fc: OnceLock::new(),
        }
    }

    fn adapters(&self) -> TransportAdapters {
        self.adapters
            .get_or_init(|| {
                self.adapter_installs.fetch_add(1, Ordering::SeqCst);
                debug!("installing transport adapters");
                (self.adapter_source)()
            })
            .clone()
    }

    /// How many times adapters have been installed; at most one
    pub fn adapter_installs(&self) -> usize {
        self.adapter_installs.load(Ordering::SeqCst)
    }

    /// The shared iSCSI connector, built on first call.
    ///
    /// Later calls with a different chroot get the existing connector.
    pub fn iscsi_connector(&self, chroot: &str) -> Arc<dyn IscsiConnector> {
        let (built_with, connector) = self.iscsi.get_or_init(|| {
            debug!(chroot, "initializing iSCSI connector");
            (chroot.to_string(), self.factory.iscsi(chroot, self.adapters()))
        });
        if built_with != chroot {
            warn!(requested = chroot, active = %built_with, "iSCSI connector already built with another chroot");
        }
        connector.clone()
    }

    /// The shared FC connector, built on first call
    pub fn fc_connector(&self, chroot: &str) -> Arc<dyn FcConnector> {
        let (built_with, connector) = self.fc.get_or_init(|| {
            debug!(chroot, "initializing FC connector");
            (chroot.to_string(), self.factory.fc(chroot, self.adapters()))
        });
        if built_with != chroot {
            warn!(requested = chroot, active = %built_with, "FC connector already built with another chroot");
        }
        connector.clone()
    }
}

impl std::fmt::Debug for ConnectorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorManager")
            .field("iscsi", &self.iscsi.get().map(|(c, _)| c))
            .field("fc", &self.fc.get().map(|(c, _)| c))
            .finish()
    }
}
