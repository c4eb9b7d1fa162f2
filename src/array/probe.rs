//! Probe Engine
//!
//! Establishes authenticated sessions with arrays. Probing a named array
//! is strict; probing without a name tries every array of the current
//! generation and succeeds on the first one that answers.

use super::descriptor::ArrayDescriptor;
use super::events::RegistryEvent;
use super::registry::ArrayRegistry;
use crate::context::RequestContext;
use crate::domain::ports::AuthFailure;
use crate::error::{Error, Result};
use crate::metrics::{Metrics, OUTCOME_FAILURE, OUTCOME_SUCCESS};
use std::sync::Arc;
use tracing::{debug, error, info, Instrument};

/// Authenticates arrays on demand
pub struct ProbeEngine {
    registry: Arc<ArrayRegistry>,
    metrics: Arc<Metrics>,
    auto_probe: bool,
}

impl ProbeEngine {
    pub fn new(registry: Arc<ArrayRegistry>, metrics: Arc<Metrics>, auto_probe: bool) -> Self {
        Self {
            registry,
            metrics,
            auto_probe,
        }
    }

    pub fn auto_probe(&self) -> bool {
        self.auto_probe
    }

    /// Authenticate one array unless its client already holds a token
    pub async fn probe_one(&self, ctx: &RequestContext, array: &ArrayDescriptor) -> Result<()> {
        let ctx = ctx.with_array_id(array.id().as_str());
        async move {
            if array.has_token() {
                debug!("array session already established");
                return Ok(());
            }

            match array.client().authenticate(&array.connect_config()).await {
                Ok(()) => {
                    self.metrics.record_probe(OUTCOME_SUCCESS);
                    self.record_outcome(array, true);
                    info!(endpoint = array.endpoint(), "array probe succeeded");
                    Ok(())
                }
                Err(failure) => {
                    self.metrics.record_probe(OUTCOME_FAILURE);
                    self.record_outcome(array, false);
                    let err = match failure {
                        AuthFailure::InvalidCredentials(reason) => Error::Unauthenticated {
                            array_id: array.id().to_string(),
                            reason,
                        },
                        AuthFailure::Unreachable(reason) => Error::Unreachable {
                            array_id: array.id().to_string(),
                            reason,
                        },
                    };
                    error!(error = %err, "array probe failed");
                    Err(err)
                }
            }
        }
        .instrument(ctx.span())
        .await
    }

    /// Probe `array_id`, or any array when `None`.
    ///
    /// Without an id, arrays are tried in id order and the first success
    /// ends the probe; remaining arrays are not contacted.
    pub async fn probe(&self, ctx: &RequestContext, array_id: Option<&str>) -> Result<()> {
        let generation = self.registry.snapshot();

        if let Some(id) = array_id.filter(|id| !id.is_empty()) {
            let array = generation
                .get(&id.into())
                .cloned()
                .ok_or_else(|| Error::ArrayNotFound {
                    array_id: id.to_lowercase(),
                })?;
            return self.probe_one(ctx, &array).await;
        }

        for array in generation.arrays() {
            match self.probe_one(ctx, &array).await {
                Ok(()) => return Ok(()),
                Err(e) => debug!(array_id = %array.id(), error = %e, "trying next array"),
            }
        }

        let _span = ctx.span().entered();
        error!(arrays = generation.len(), "no array could be probed");
        Err(Error::AllArraysUnavailable)
    }

    /// Probe when auto-probe is enabled; otherwise refuse to proceed
    pub async fn require_probe(&self, ctx: &RequestContext, array_id: Option<&str>) -> Result<()> {
        if !self.auto_probe {
            return Err(Error::NotProbed);
        }
        debug!("probing arrays automatically");
        self.probe(ctx, array_id).await
    }

    fn record_outcome(&self, array: &ArrayDescriptor, succeeded: bool) {
        if array.set_probe_succeeded(succeeded) != succeeded {
            self.registry.publish(RegistryEvent::ProbeStatusChanged {
                array_id: array.id().to_string(),
                succeeded,
            });
        }
    }
}

impl std::fmt::Debug for ProbeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeEngine")
            .field("auto_probe", &self.auto_probe)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{entry, MockClient};
    use assert_matches::assert_matches;

    fn engine_with(arrays: Vec<ArrayDescriptor>, auto_probe: bool) -> (Arc<ArrayRegistry>, ProbeEngine) {
        let registry = ArrayRegistry::new();
        registry.replace_all(arrays).unwrap();
        let engine = ProbeEngine::new(registry.clone(), Metrics::new().unwrap(), auto_probe);
        (registry, engine)
    }

    #[tokio::test]
    async fn test_probe_named_array() {
        let client = MockClient::healthy();
        let (registry, engine) =
            engine_with(vec![ArrayDescriptor::new(entry("apm001", true), client.clone())], false);

        engine.probe(&RequestContext::new(), Some("APM001")).await.unwrap();

        assert_eq!(client.auth_calls(), 1);
        assert!(registry.get("apm001").unwrap().probe_succeeded());
    }

    #[tokio::test]
    async fn test_probe_skips_arrays_with_token() {
        let client = MockClient::authenticated();
        let (registry, engine) =
            engine_with(vec![ArrayDescriptor::new(entry("apm001", true), client.clone())], false);

        engine.probe(&RequestContext::new(), Some("apm001")).await.unwrap();

        assert_eq!(client.auth_calls(), 0);
        assert!(!registry.get("apm001").unwrap().probe_succeeded());
    }

    #[tokio::test]
    async fn test_probe_unknown_array() {
        let (_, engine) = engine_with(vec![ArrayDescriptor::new(entry("apm001", true), MockClient::healthy())], false);

        assert_matches!(
            engine.probe(&RequestContext::new(), Some("apm999")).await,
            Err(Error::ArrayNotFound { array_id }) if array_id == "apm999"
        );
    }

    #[tokio::test]
    async fn test_probe_failure_kinds() {
        let (registry, engine) = engine_with(
            vec![
                ArrayDescriptor::new(entry("apm001", false), MockClient::rejecting()),
                ArrayDescriptor::new(entry("apm002", false), MockClient::unreachable()),
            ],
            false,
        );

        assert_matches!(
            engine.probe(&RequestContext::new(), Some("apm001")).await,
            Err(Error::Unauthenticated { .. })
        );
        assert_matches!(
            engine.probe(&RequestContext::new(), Some("apm002")).await,
            Err(Error::Unreachable { .. })
        );
        assert!(!registry.get("apm001").unwrap().probe_succeeded());
    }

    #[tokio::test]
    async fn test_probe_any_short_circuits() {
        let first = MockClient::healthy();
        let second = MockClient::healthy();
        let (_, engine) = engine_with(
            vec![
                ArrayDescriptor::new(entry("apm001", true), first.clone()),
                ArrayDescriptor::new(entry("apm002", false), second.clone()),
            ],
            false,
        );

        engine.probe(&RequestContext::new(), None).await.unwrap();

        assert_eq!(first.auth_calls(), 1);
        assert_eq!(second.auth_calls(), 0);
    }

    #[tokio::test]
    async fn test_probe_any_falls_back() {
        let down = MockClient::unreachable();
        let up = MockClient::healthy();
        let (registry, engine) = engine_with(
            vec![
                ArrayDescriptor::new(entry("apm001", true), down.clone()),
                ArrayDescriptor::new(entry("apm002", false), up.clone()),
            ],
            false,
        );

        engine.probe(&RequestContext::new(), None).await.unwrap();

        assert_eq!(down.auth_calls(), 1);
        assert_eq!(up.auth_calls(), 1);
        assert!(!registry.get("apm001").unwrap().probe_succeeded());
        assert!(registry.get("apm002").unwrap().probe_succeeded());
    }

    #[tokio::test]
    async fn test_probe_any_all_down() {
        let (_, engine) = engine_with(
            vec![
                ArrayDescriptor::new(entry("apm001", true), MockClient::unreachable()),
                ArrayDescriptor::new(entry("apm002", false), MockClient::rejecting()),
            ],
            false,
        );
        assert_matches!(
            engine.probe(&RequestContext::new(), None).await,
            Err(Error::AllArraysUnavailable)
        );
    }

    #[tokio::test]
    async fn test_probe_any_on_empty_registry() {
        let engine = ProbeEngine::new(ArrayRegistry::new(), Metrics::new().unwrap(), true);
        assert_matches!(
            engine.probe(&RequestContext::new(), None).await,
            Err(Error::AllArraysUnavailable)
        );
    }

    #[tokio::test]
    async fn test_require_probe_honors_auto_probe() {
        let client = MockClient::healthy();
        let (_, engine) =
            engine_with(vec![ArrayDescriptor::new(entry("apm001", true), client.clone())], false);
        assert_matches!(
            engine.require_probe(&RequestContext::new(), None).await,
            Err(Error::NotProbed)
        );
        assert_eq!(client.auth_calls(), 0);

        let (_, engine) =
            engine_with(vec![ArrayDescriptor::new(entry("apm001", true), client.clone())], true);
        engine.require_probe(&RequestContext::new(), None).await.unwrap();
        assert_eq!(client.auth_calls(), 1);
    }

    #[tokio::test]
    async fn test_probe_status_event_only_on_change() {
        let client = MockClient::healthy();
        let (registry, engine) =
            engine_with(vec![ArrayDescriptor::new(entry("apm001", true), client.clone())], false);
        let mut events = registry.subscribe();

        engine.probe(&RequestContext::new(), Some("apm001")).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::ProbeStatusChanged {
                array_id: "apm001".to_string(),
                succeeded: true,
            }
        );
        assert!(events.try_recv().is_err());
    }
}
