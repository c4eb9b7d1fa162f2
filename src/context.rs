//! Request Correlation Context
//!
//! Every unit of work (an inbound request, one reload cycle, one node-sync
//! cycle) carries a [`RequestContext`]: an immutable bag of correlation
//! fields. Deriving a context copies the parent's fields and adds new ones,
//! so fields only ever flow downward and a context shared between tasks is
//! never mutated.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::Span;

/// Field holding the run identifier
pub const RUN_ID: &str = "runid";

/// Field holding the array identifier, once known
pub const ARRAY_ID: &str = "arrayid";

/// Inbound metadata key carrying a caller-supplied request id
pub const REQUEST_ID_KEY: &str = "csi.requestid";

// =============================================================================
// Request Context
// =============================================================================

/// Immutable, append-only correlation fields for one unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    fields: Arc<BTreeMap<String, String>>,
}

impl RequestContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a new context carrying every field of this one plus `key`
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut fields = (*self.fields).clone();
        fields.insert(key.into(), value.into());
        Self {
            fields: Arc::new(fields),
        }
    }

    pub fn with_run_id(&self, run_id: impl Into<String>) -> Self {
        self.with_field(RUN_ID, run_id)
    }

    pub fn with_array_id(&self, array_id: impl Into<String>) -> Self {
        self.with_field(ARRAY_ID, array_id)
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn run_id(&self) -> Option<&str> {
        self.get(RUN_ID)
    }

    pub fn array_id(&self) -> Option<&str> {
        self.get(ARRAY_ID)
    }

    /// Iterate over all fields in key order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Prefix a user-visible message with the run id, if one is set
    pub fn message(&self, msg: &str) -> String {
        match self.run_id() {
            Some(run_id) => format!("runid={} {}", run_id, msg),
            None => msg.to_string(),
        }
    }

    /// Tracing span carrying the correlation fields
    pub fn span(&self) -> Span {
        let span = tracing::info_span!(
            "csi",
            runid = tracing::field::Empty,
            arrayid = tracing::field::Empty
        );
        if let Some(run_id) = self.run_id() {
            span.record(RUN_ID, run_id);
        }
        if let Some(array_id) = self.array_id() {
            span.record(ARRAY_ID, array_id);
        }
        span
    }
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (key, value) in self.fields() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

// =============================================================================
// Run Id Generation
// =============================================================================

/// Background cycles that number their runs independently of requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunScope {
    /// Credentials reload cycles
    Config,
    /// Node-info sync cycles
    Node,
}

impl std::fmt::Display for RunScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunScope::Config => write!(f, "config"),
            RunScope::Node => write!(f, "node"),
        }
    }
}

/// Hands out run identifiers for requests and background cycles
#[derive(Debug, Default)]
pub struct RunIdGenerator {
    requests: AtomicU64,
    config_runs: AtomicU32,
    node_runs: AtomicU32,
}

impl RunIdGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next request run id (monotonically increasing, starting at 1)
    pub fn next_request(&self) -> String {
        (self.requests.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Next run id for a background scope, e.g. `config-0`, `config-1`
    pub fn next_scoped(&self, scope: RunScope) -> String {
        let counter = match scope {
            RunScope::Config => &self.config_runs,
            RunScope::Node => &self.node_runs,
        };
        format!("{}-{}", scope, counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Context for an inbound request: the caller's request id when the
    /// metadata carries one, otherwise the next request counter value
    pub fn incoming(&self, metadata: &HashMap<String, String>) -> RequestContext {
        let run_id = match metadata.get(REQUEST_ID_KEY) {
            Some(id) if !id.is_empty() => id.clone(),
            _ => self.next_request(),
        };
        RequestContext::new().with_run_id(run_id)
    }

    /// Derive a context for the next cycle of a background scope
    pub fn scoped(&self, parent: &RequestContext, scope: RunScope) -> RequestContext {
        parent.with_run_id(self.next_scoped(scope))
    }
}
