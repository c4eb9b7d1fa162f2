//! Transport logging adapters
//!
//! Connectors report through [`TransportLogger`]/[`TransportTracer`] so
//! their output carries the caller's correlation fields.

use crate::context::RequestContext;
use crate::domain::ports::{TransportAdapters, TransportLogger, TransportTracer};
use std::sync::Arc;
use tracing::{debug, error, info, trace};

/// Forwards connector log lines to `tracing` inside the caller's span
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTransportLogger;

impl TransportLogger for TracingTransportLogger {
    fn info(&self, ctx: &RequestContext, msg: &str) {
        let _span = ctx.span().entered();
        info!(target: "csi_array_plane::transport", "{}", msg);
    }

    fn debug(&self, ctx: &RequestContext, msg: &str) {
        let _span = ctx.span().entered();
        debug!(target: "csi_array_plane::transport", "{}", msg);
    }

    fn error(&self, ctx: &RequestContext, msg: &str) {
        let _span = ctx.span().entered();
        error!(target: "csi_array_plane::transport", "{}", msg);
    }
}

/// Emits connector traces at `trace` level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTransportTracer;

impl TransportTracer for TracingTransportTracer {
    fn trace(&self, ctx: &RequestContext, msg: &str) {
        let _span = ctx.span().entered();
        trace!(target: "csi_array_plane::transport", "{}", msg);
    }
}

/// Adapters backed by the process-wide `tracing` subscriber
pub fn tracing_adapters() -> TransportAdapters {
    TransportAdapters {
        logger: Arc::new(TracingTransportLogger),
        tracer: Arc::new(TracingTransportTracer),
    }
}
