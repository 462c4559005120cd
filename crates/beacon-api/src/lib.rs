//! beacon-api - HTTP + WebSocket server for the beacon alert service.
//!
//! Ingestion (`POST /api/sos`) is deliberately unauthenticated: field
//! devices are trusted through out-of-band provisioning. Mutations
//! (resolve/unresolve) require a bearer token from `POST /api/login`.
//! Viewers subscribe at `/ws` and receive the broadcast stream.

pub mod history;
pub mod session;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use beacon_core::{
    BroadcastBus, BroadcastMessage, EventStore, SosReport, TokenAuthority, DEFAULT_LIST_LIMIT,
};

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Application state shared across handlers and sessions.
#[derive(Clone)]
pub struct AppState {
    /// Authoritative device/event ledger.
    pub store: Arc<EventStore>,
    /// Fan-out bus feeding every subscriber session.
    pub bus: Arc<BroadcastBus>,
    /// Token issuer/verifier.
    pub auth: Arc<TokenAuthority>,
    /// Active subscriber session count.
    pub ws_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(auth: TokenAuthority) -> Self {
        Self {
            store: Arc::new(EventStore::new()),
            bus: Arc::new(BroadcastBus::new(256)),
            auth: Arc::new(auth),
            ws_connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/login", post(login))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/:id/history", get(device_history))
        .route("/api/sos", post(report_sos))
        .route("/api/sos/latest", get(latest_sos))
        .route("/api/sos/list", get(list_sos))
        .route("/api/sos/history/:device_id", get(sos_history))
        .route("/api/sos/:event_id/resolve", post(resolve_sos))
        .route("/api/sos/:event_id/unresolve", post(unresolve_sos))
        .route("/ws", get(session::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// `POST /api/login` — exchange the demo credential pair for a bearer token.
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (email, password) = match (body.email.as_deref(), body.password.as_deref()) {
        (Some(email), Some(password)) => (email, password),
        _ => return Err(ApiError::BadRequest("email and password required".to_string())),
    };
    let token = state.auth.login(email, password)?;
    Ok(Json(serde_json::json!({ "token": token })))
}

/// `GET /api/devices` — full device snapshot (auth required).
async fn list_devices(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_auth(&state, &headers)?;
    Ok(Json(state.store.snapshot().await))
}

/// `GET /api/devices/:id/history` — synthetic position walk around the
/// device's current location (auth required).
async fn device_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_auth(&state, &headers)?;
    let device = state
        .store
        .device(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("device not found".to_string()))?;
    Ok(Json(history::synthetic_track(device.lat, device.lng)))
}

/// `POST /api/sos` — ingest a report from a field device (no auth by
/// design) and broadcast the new event to every session.
async fn report_sos(
    State(state): State<AppState>,
    Json(report): Json<SosReport>,
) -> Result<impl IntoResponse, ApiError> {
    let (device, event) = state.store.report_sos(&report).await?;
    state.bus.broadcast(&BroadcastMessage::Sos {
        event: event.clone(),
        device,
    });
    Ok(Json(serde_json::json!({ "ok": true, "event": event })))
}

/// `GET /api/sos/latest` — the most recent event and its device.
async fn latest_sos(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let (event, device) = state
        .store
        .latest()
        .await
        .ok_or_else(|| ApiError::NotFound("no events".to_string()))?;
    Ok(Json(serde_json::json!({ "event": event, "device": device })))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

/// `GET /api/sos/list?limit=N` — recent events, newest first.
async fn list_sos(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let rows = state
        .store
        .list_recent(None, query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await;
    Json(serde_json::json!({ "rows": rows }))
}

/// `GET /api/sos/history/:deviceId?limit=N` — one device's events in
/// chronological order, for track drawing. Unknown devices yield a null
/// device and an empty list rather than an error.
async fn sos_history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let (device, points) = state
        .store
        .history(&device_id, query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await;
    Json(serde_json::json!({ "device": device, "points": points }))
}

/// `POST /api/sos/:eventId/resolve` — mark resolved (auth required) and
/// broadcast the transition.
async fn resolve_sos(
    State(state): State<AppState>,
    Path(event_id): Path<u64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_auth(&state, &headers)?;
    let (event, device) = state.store.resolve(event_id, &actor.email).await?;
    state.bus.broadcast(&BroadcastMessage::SosResolved {
        event_id,
        event: event.clone(),
        device,
    });
    Ok(Json(serde_json::json!({ "ok": true, "event": event })))
}

/// `POST /api/sos/:eventId/unresolve` — reopen an event (auth required)
/// and broadcast the transition.
async fn unresolve_sos(
    State(state): State<AppState>,
    Path(event_id): Path<u64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let actor = require_auth(&state, &headers)?;
    let (event, device) = state.store.unresolve(event_id).await?;
    tracing::info!(event_id, actor = %actor.email, "event reopened via API");
    state.bus.broadcast(&BroadcastMessage::SosUnresolved {
        event_id,
        event: event.clone(),
        device,
    });
    Ok(Json(serde_json::json!({ "ok": true, "event": event })))
}

/// Resolve the bearer identity for a mutation-requiring endpoint.
fn require_auth(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<beacon_core::SessionUser, ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;
    Ok(state.auth.verify_bearer(header)?)
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

/// HTTP-facing error, rendered as `{"error": message}` with a matching
/// status code.
#[derive(Debug)]
pub enum ApiError {
    Internal(beacon_core::Error),
    Unauthorized(String),
    NotFound(String),
    BadRequest(String),
}

impl From<beacon_core::Error> for ApiError {
    fn from(err: beacon_core::Error) -> Self {
        use beacon_core::Error;
        match err {
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::EventNotFound(_) => ApiError::NotFound("Event not found".to_string()),
            Error::DeviceNotFound(_) => ApiError::NotFound("device not found".to_string()),
            Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        let body = Json(serde_json::json!({ "error": message }));
        (status, body).into_response()
    }
}
