//! Control Plane Metrics
//!
//! Prometheus collectors for reloads, probes and node-info syncs. The
//! collectors live in their own registry so tests and multiple services in
//! one process never collide on registration.

use crate::error::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Outcome label for counters
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";

/// Collectors exported by the control plane
pub struct Metrics {
    registry: Registry,
    /// Credentials reload attempts by outcome
    pub reloads: IntCounterVec,
    /// Arrays in the current generation
    pub arrays_configured: IntGauge,
    /// Current registry generation
    pub generation: IntGauge,
    /// Array probe attempts by outcome
    pub probes: IntCounterVec,
    /// Node-info sync runs by outcome
    pub node_syncs: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let reloads = IntCounterVec::new(
            Opts::new("csi_array_config_reloads_total", "Credentials reload attempts"),
            &["outcome"],
        )?;
        let arrays_configured = IntGauge::new(
            "csi_array_configured",
            "Number of arrays in the current registry generation",
        )?;
        let generation = IntGauge::new(
            "csi_array_registry_generation",
            "Current registry generation number",
        )?;
        let probes = IntCounterVec::new(
            Opts::new("csi_array_probes_total", "Array authentication probes"),
            &["outcome"],
        )?;
        let node_syncs = IntCounterVec::new(
            Opts::new("csi_array_node_syncs_total", "Node-info sync runs"),
            &["outcome"],
        )?;

        registry.register(Box::new(reloads.clone()))?;
        registry.register(Box::new(arrays_configured.clone()))?;
        registry.register(Box::new(generation.clone()))?;
        registry.register(Box::new(probes.clone()))?;
        registry.register(Box::new(node_syncs.clone()))?;

        Ok(Arc::new(Self {
            registry,
            reloads,
            arrays_configured,
            generation,
            probes,
            node_syncs,
        }))
    }

    /// Record a finished reload
    pub fn record_reload(&self, outcome: &str) {
        self.reloads.with_label_values(&[outcome]).inc();
    }

    /// Record an installed generation
    pub fn record_generation(&self, generation: u64, array_count: usize) {
        self.generation.set(generation as i64);
        self.arrays_configured.set(array_count as i64);
    }

    pub fn record_probe(&self, outcome: &str) {
        self.probes.with_label_values(&[outcome]).inc();
    }

    pub fn record_node_sync(&self, outcome: &str) {
        self.node_syncs.with_label_values(&[outcome]).inc();
    }

    /// Render all collectors in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
