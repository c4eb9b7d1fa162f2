//! Credentials Watcher
//!
//! The orchestrator publishes secret updates by writing a fresh timestamped
//! directory next to the credentials file and then atomically renaming a
//! `..data` symlink onto it. Creation of `..data` in the watched directory
//! is the only signal that a reload is due.
//!
//! Notifications are funnelled through a single-slot channel: while one
//! reload is pending, further notifications collapse into it.

use super::synchronizer::ConfigSynchronizer;
use crate::context::{RequestContext, RunIdGenerator, RunScope};
use crate::controlplane::node_sync::NodeSyncTrigger;
use crate::error::Result;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Name of the symlink swapped on every secret update
pub const DATA_POINTER: &str = "..data";

/// Requests a reload; requests made while one is pending are merged
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    tx: mpsc::Sender<()>,
}

impl ReloadTrigger {
    /// Returns false when the request was merged into a pending one
    pub fn fire(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => false,
            Err(TrySendError::Closed(())) => {
                warn!("reload loop has stopped, dropping reload request");
                false
            }
        }
    }
}

/// Create a reload trigger and the receiver the reload loop drains
pub fn reload_channel() -> (ReloadTrigger, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (ReloadTrigger { tx }, rx)
}

/// Whether `event` reports `data_path` coming into existence
pub fn is_data_pointer_event(event: &Event, data_path: &Path) -> bool {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().any(|p| p == data_path)
        }
        // Paths are [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().map(|p| p == data_path).unwrap_or(false)
        }
        _ => false,
    }
}

/// Watches the credentials directory and drives reloads
pub struct ConfigWatcher {
    synchronizer: Arc<ConfigSynchronizer>,
    run_ids: Arc<RunIdGenerator>,
    node_sync: Option<NodeSyncTrigger>,
    shutdown: CancellationToken,
}

impl ConfigWatcher {
    pub fn new(
        synchronizer: Arc<ConfigSynchronizer>,
        run_ids: Arc<RunIdGenerator>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            synchronizer,
            run_ids,
            node_sync: None,
            shutdown,
        }
    }

    /// Signal node-info sync after every reload attempt
    pub fn with_node_sync(mut self, trigger: NodeSyncTrigger) -> Self {
        self.node_sync = Some(trigger);
        self
    }

    /// Subscribe to the credentials directory and start the reload loop.
    ///
    /// Fails only when the directory cannot be watched.
    pub fn spawn(self, ctx: &RequestContext) -> Result<JoinHandle<()>> {
        let (trigger, rx) = reload_channel();
        let watch_dir = self.synchronizer.watch_dir();
        let data_path = self.synchronizer.data_path();

        let event_ctx = ctx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _span = event_ctx.span().entered();
            match res {
                Ok(event) if is_data_pointer_event(&event, &data_path) => {
                    info!(path = %data_path.display(), "driver config changed");
                    if !trigger.fire() {
                        debug!("reload already pending");
                    }
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "driver config watch error"),
            }
        })?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
        info!(dir = %watch_dir.display(), "watching driver config directory");

        let ctx = ctx.clone();
        Ok(tokio::spawn(async move {
            // Dropping the watcher ends the subscription
            let _watcher = watcher;
            self.run(ctx, rx).await;
        }))
    }

    /// Drain reload requests until shutdown
    pub async fn run(self, ctx: RequestContext, mut rx: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("config watcher stopping");
                    break;
                }
                request = rx.recv() => match request {
                    Some(()) => self.reload_cycle(&ctx).await,
                    None => break,
                },
            }
        }
    }

    async fn reload_cycle(&self, parent: &RequestContext) {
        let ctx = self.run_ids.scoped(parent, RunScope::Config);
        // Failures are logged by the synchronizer; the old generation stays
        let _ = self.synchronizer.reload(&ctx).await;

        if let Some(node_sync) = &self.node_sync {
            let _span = ctx.span().entered();
            debug!("signalling node-info sync");
            node_sync.signal();
        }
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("dir", &self.synchronizer.watch_dir())
            .finish_non_exhaustive()
    }
}

/// Directory the watcher subscribes to for a credentials path
pub fn watch_dir_for(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
