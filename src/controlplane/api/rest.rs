//! REST API Handlers
//!
//! Status endpoints over the control plane: health, readiness, metrics,
//! the configured arrays, probing and volume id resolution.

use crate::array::ArrayStatus;
use crate::context::RequestContext;
use crate::controlplane::service::{ResolvedVolumeInfo, Service};
use crate::error::{Error, StatusCode as CsiCode};
use axum::{
    extract::{Json, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Probe request; without an array id any array will do
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRequest {
    #[serde(default)]
    pub array_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResponse {
    pub run_id: String,
    pub probed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveVolumeRequest {
    pub volume_id: String,
}

/// Configured arrays of the current generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayListResponse {
    pub generation: u64,
    pub installed_at: DateTime<Utc>,
    pub arrays: Vec<ArrayStatus>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiErrorResponse {
    fn from_error(err: &Error, ctx: &RequestContext) -> (StatusCode, Self) {
        let status = err.to_status(ctx);
        let http = match status.code {
            CsiCode::InvalidArgument => StatusCode::BAD_REQUEST,
            CsiCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            CsiCode::NotFound => StatusCode::NOT_FOUND,
            CsiCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            CsiCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            http,
            Self {
                error: status.code.to_string(),
                message: status.message,
                details: None,
            },
        )
    }
}

fn error_response(err: Error, ctx: &RequestContext) -> Response {
    let (status, body) = ApiErrorResponse::from_error(&err, ctx);
    (status, Json(body)).into_response()
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    service: Arc<Service>,
}

impl RestRouter {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            service: self.service,
        };

        Router::new()
            .route("/v1/arrays", get(list_arrays))
            .route("/v1/arrays/:id", get(get_array))
            .route("/v1/probe", post(probe))
            .route("/v1/volumes/resolve", post(resolve_volume))
            .route("/metrics", get(metrics))
            .route("/healthz", get(health_check))
            .route("/readyz", get(readiness_check))
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<Service>,
}

impl AppState {
    fn context(&self, headers: &HeaderMap) -> RequestContext {
        let metadata: HashMap<String, String> = headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        self.service.incoming_context(&metadata)
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_arrays(State(state): State<AppState>) -> impl IntoResponse {
    let generation = state.service.registry().snapshot();
    Json(ArrayListResponse {
        generation: generation.number(),
        installed_at: generation.installed_at(),
        arrays: generation.arrays().iter().map(|a| a.status()).collect(),
    })
}

async fn get_array(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    match state.service.registry().get(id.as_str()) {
        Some(array) => Json(array.status()).into_response(),
        None => {
            let ctx = state.context(&headers);
            error_response(Error::ArrayNotFound { array_id: id.to_lowercase() }, &ctx)
        }
    }
}

async fn probe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<ProbeRequest>>,
) -> Response {
    let ctx = state.context(&headers);
    let request = body.map(|Json(r)| r).unwrap_or_default();
    debug!(array_id = ?request.array_id, "probe requested");

    match state.service.probe(&ctx, request.array_id.as_deref()).await {
        Ok(()) => Json(ProbeResponse {
            run_id: ctx.run_id().unwrap_or_default().to_string(),
            probed: true,
        })
        .into_response(),
        Err(e) => error_response(e, &ctx),
    }
}

async fn resolve_volume(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ResolveVolumeRequest>,
) -> Response {
    let ctx = state.context(&headers);
    match state.service.resolve_volume(&ctx, &request.volume_id) {
        Ok(resolved) => Json(ResolvedVolumeInfo::from(&resolved)).into_response(),
        Err(e) => error_response(e, &ctx),
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.service.metrics().render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.service.is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
    }
}
