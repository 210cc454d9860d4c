//! HTTP handlers and router for the webhook service.
//!
//! The ingestion path runs signature verification over the raw body bytes
//! before anything is parsed, then validates, then inserts. Query endpoints
//! read straight from the store. Every response, error branches included,
//! passes through the tracking middleware that feeds the HTTP counter and
//! the latency histogram.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::metrics::{Metrics, WebhookOutcome};
use crate::signature::verify_signature;
use crate::store::{
    InsertOutcome, MessagePage, MessageQuery, MessageStore, NewMessage, StatsSummary, StoreError,
};
use crate::web::payload::{PayloadError, WebhookPayload};

/// Header carrying the hex HMAC-SHA256 digest of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: MessageStore,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, store: MessageStore, metrics: Metrics) -> Self {
        Self {
            config: Arc::new(config),
            store,
            metrics: Arc::new(metrics),
        }
    }
}

/// Build the application router with all routes and instrumentation.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/webhook", post(webhook))
        .route("/messages", get(messages))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics_text))
        // Panics convert to 500 inside the tracking middleware, so even an
        // unexpected fault still lands in the counters and the request log
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_request,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

/// Request-processing failure, mapped to an HTTP response at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing header, unconfigured secret, or digest mismatch; callers
    /// get the same response for all three.
    #[error("invalid signature")]
    InvalidSignature,

    #[error(transparent)]
    Validation(#[from] PayloadError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::Storage(e) => {
                error!(error = %e, "storage_unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage unavailable".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

// =============================================================================
// Request tracking middleware
// =============================================================================

/// Per-request instrumentation: request id, latency, one structured log
/// event, and the HTTP counter + latency histogram. Runs for every
/// response regardless of which branch produced it.
pub async fn track_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16();

    state.metrics.inc_http(&path, status);
    state.metrics.observe_latency(&path, latency_ms);

    if response.status().is_server_error() {
        error!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status,
            latency_ms,
            "request_completed"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status,
            latency_ms,
            "request_completed"
        );
    }

    response
}

// =============================================================================
// Health Probes
// =============================================================================

/// Health probe response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe.
pub async fn live() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Readiness probe: ready only with a configured secret and reachable storage.
pub async fn ready(State(state): State<AppState>) -> Response {
    if state.config.webhook_secret.is_none() {
        return not_ready();
    }
    match state.store.ping() {
        Ok(()) => Json(HealthResponse { status: "ready" }).into_response(),
        Err(e) => {
            warn!(error = %e, "readiness_storage_check_failed");
            not_ready()
        }
    }
}

fn not_ready() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(HealthResponse {
            status: "not ready",
        }),
    )
        .into_response()
}

// =============================================================================
// Webhook Ingestion
// =============================================================================

/// Acknowledgement returned for first deliveries and replays alike.
#[derive(Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

/// Webhook ingestion endpoint.
///
/// A replayed `message_id` is acknowledged exactly like a first delivery;
/// only metrics and logs distinguish the two.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let secret = state.config.webhook_secret.as_deref().unwrap_or_default();

    if !verify_signature(secret, &body, provided) {
        state.metrics.inc_webhook(WebhookOutcome::InvalidSignature);
        warn!(has_signature = !provided.is_empty(), "webhook_signature_invalid");
        return Err(AppError::InvalidSignature);
    }

    let payload = match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(p) => p,
        Err(e) => {
            state.metrics.inc_webhook(WebhookOutcome::ValidationError);
            warn!(error = %e, "webhook_payload_malformed");
            return Err(PayloadError::Malformed(e.to_string()).into());
        }
    };
    let payload = match payload.validate() {
        Ok(p) => p,
        Err(e) => {
            state.metrics.inc_webhook(WebhookOutcome::ValidationError);
            warn!(reason = %e, "webhook_payload_invalid");
            return Err(e.into());
        }
    };

    let message = NewMessage {
        message_id: payload.message_id,
        from_msisdn: payload.from_msisdn,
        to_msisdn: payload.to_msisdn,
        ts: payload.ts,
        text: payload.text,
    };
    let outcome = state.store.insert(&message)?;
    let dup = outcome == InsertOutcome::Duplicate;
    let result = if dup {
        WebhookOutcome::Duplicate
    } else {
        WebhookOutcome::Created
    };
    state.metrics.inc_webhook(result);

    info!(
        message_id = %message.message_id,
        dup,
        result = result.as_str(),
        "webhook_recorded"
    );

    Ok(Json(WebhookAck { status: "ok" }))
}

// =============================================================================
// Query Endpoints
// =============================================================================

/// Query string accepted by `GET /messages`.
#[derive(Debug, Deserialize)]
pub struct MessagesParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(rename = "from")]
    pub from_msisdn: Option<String>,
    pub since: Option<String>,
    pub q: Option<String>,
}

fn default_limit() -> i64 {
    50
}

/// List stored messages with optional filters, ordered by `ts` ascending.
///
/// `limit` is clamped to [1, 100] and `offset` to ≥ 0 before the query runs.
pub async fn messages(
    State(state): State<AppState>,
    Query(params): Query<MessagesParams>,
) -> Result<Json<MessagePage>, AppError> {
    let query = MessageQuery {
        limit: params.limit.clamp(1, 100),
        offset: params.offset.max(0),
        from_msisdn: params.from_msisdn,
        since: params.since,
        text_contains: params.q,
    };
    Ok(Json(state.store.query(&query)?))
}

/// Aggregate statistics over all stored messages.
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsSummary>, AppError> {
    Ok(Json(state.store.stats()?))
}

/// Plain-text metrics exposition.
pub async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render_text(),
    )
}
