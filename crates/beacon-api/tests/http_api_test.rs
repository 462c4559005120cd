//! Integration tests for the HTTP API surface.
//!
//! Tests drive the full router in-process with `tower::ServiceExt::oneshot`,
//! so every layer (request-id, CORS, state extraction, error rendering)
//! is exercised without binding a socket.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use beacon_api::{app, AppState};
use beacon_core::{TokenAuthority, DEMO_EMAIL, DEMO_PASSWORD};

fn test_state() -> AppState {
    AppState::new(TokenAuthority::new(b"test-secret"))
}

fn bearer_token(state: &AppState) -> String {
    let token = state
        .auth
        .login(DEMO_EMAIL, DEMO_PASSWORD)
        .expect("demo login should succeed");
    format!("Bearer {token}")
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should not fail");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be JSON")
    };
    (status, body)
}

async fn report(app: &Router, device_id: &str, lat: f64, lng: f64) -> serde_json::Value {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/sos",
            serde_json::json!({ "deviceId": device_id, "lat": lat, "lng": lng }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "report should succeed: {body}");
    body
}

// =============================================================================
// HEALTH AND LOGIN
// =============================================================================

#[tokio::test]
async fn test_health_returns_ok() {
    let app = app(test_state());
    let (status, body) = send(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_login_issues_verifiable_token() {
    let state = test_state();
    let app = app(state.clone());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/login",
            serde_json::json!({ "email": DEMO_EMAIL, "password": DEMO_PASSWORD }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().expect("token should be a string");
    let user = state.auth.verify(token).expect("issued token should verify");
    assert_eq!(user.email, DEMO_EMAIL);
}

#[tokio::test]
async fn test_login_missing_fields_returns_400() {
    let app = app(test_state());
    let (status, body) = send(
        &app,
        json_request("POST", "/api/login", serde_json::json!({ "email": DEMO_EMAIL })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "email and password required");
}

#[tokio::test]
async fn test_login_bad_credentials_returns_401() {
    let app = app(test_state());
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/login",
            serde_json::json!({ "email": DEMO_EMAIL, "password": "wrong" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

// =============================================================================
// SOS INGESTION
// =============================================================================

#[tokio::test]
async fn test_report_assigns_sequential_event_ids() {
    let app = app(test_state());

    let first = report(&app, "dev1", 25.5, 91.9).await;
    assert_eq!(first["ok"], true);
    assert_eq!(first["event"]["id"], 1);
    assert_eq!(first["event"]["deviceId"], "dev1");

    let second = report(&app, "dev2", 26.0, 92.0).await;
    assert_eq!(second["event"]["id"], 2);
}

#[tokio::test]
async fn test_report_accepts_string_coordinates() {
    let app = app(test_state());
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/sos",
            serde_json::json!({ "deviceId": "dev1", "lat": "25.57", "lng": "91.88" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "string coordinates are valid: {body}");
    assert_eq!(body["event"]["lat"], 25.57);
    assert_eq!(body["event"]["lng"], 91.88);
}

#[tokio::test]
async fn test_report_missing_device_id_returns_400_without_side_effects() {
    let app = app(test_state());
    let (status, body) = send(
        &app,
        json_request("POST", "/api/sos", serde_json::json!({ "lat": 25.5, "lng": 91.9 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // The rejected report must not have registered anything.
    let (status, _) = send(&app, get_request("/api/sos/latest")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_report_non_numeric_coordinates_returns_400() {
    let app = app(test_state());
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/sos",
            serde_json::json!({ "deviceId": "dev1", "lat": "north", "lng": 91.9 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_is_broadcast_to_subscribers() {
    let state = test_state();
    let app = app(state.clone());
    let mut rx = state.bus.subscribe();

    report(&app, "dev1", 25.5, 91.9).await;

    let frame = rx.try_recv().expect("a frame should have been broadcast");
    let message: serde_json::Value =
        serde_json::from_str(&frame).expect("frame should be JSON");
    assert_eq!(message["type"], "sos");
    assert_eq!(message["event"]["id"], 1);
    assert_eq!(message["device"]["id"], "dev1");
}

// =============================================================================
// QUERIES
// =============================================================================

#[tokio::test]
async fn test_latest_404_until_first_report() {
    let app = app(test_state());

    let (status, _) = send(&app, get_request("/api/sos/latest")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    report(&app, "dev1", 25.5, 91.9).await;
    report(&app, "dev2", 26.0, 92.0).await;

    let (status, body) = send(&app, get_request("/api/sos/latest")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["id"], 2);
    assert_eq!(body["device"]["id"], "dev2");
}

#[tokio::test]
async fn test_list_respects_limit_newest_first() {
    let app = app(test_state());
    for i in 0..5 {
        report(&app, &format!("dev{i}"), 25.0 + i as f64, 91.0).await;
    }

    let (status, body) = send(&app, get_request("/api/sos/list?limit=3")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["rows"].as_array().expect("rows should be an array");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["event"]["id"], 5);
    assert_eq!(rows[2]["event"]["id"], 3);
}

#[tokio::test]
async fn test_sos_history_unknown_device_yields_null_device() {
    let app = app(test_state());
    let (status, body) = send(&app, get_request("/api/sos/history/ghost")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["device"].is_null());
    assert_eq!(body["points"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_sos_history_chronological_for_device() {
    let app = app(test_state());
    report(&app, "dev1", 25.5, 91.9).await;
    report(&app, "dev2", 26.0, 92.0).await;
    report(&app, "dev1", 25.6, 91.8).await;

    let (status, body) = send(&app, get_request("/api/sos/history/dev1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device"]["id"], "dev1");
    let points = body["points"].as_array().expect("points should be an array");
    assert_eq!(points.len(), 2);
    // Oldest first, other devices excluded.
    assert_eq!(points[0]["id"], 1);
    assert_eq!(points[1]["id"], 3);
}

// =============================================================================
// RESOLUTION
// =============================================================================

#[tokio::test]
async fn test_resolve_requires_auth() {
    let app = app(test_state());
    report(&app, "dev1", 25.5, 91.9).await;

    let (status, _) = send(
        &app,
        json_request("POST", "/api/sos/1/resolve", serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_resolve_records_actor_and_broadcasts() {
    let state = test_state();
    let app = app(state.clone());
    report(&app, "dev1", 25.5, 91.9).await;

    let mut rx = state.bus.subscribe();
    let request = Request::builder()
        .method("POST")
        .uri("/api/sos/1/resolve")
        .header(header::AUTHORIZATION, bearer_token(&state))
        .body(Body::empty())
        .expect("request should build");
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["resolved"], true);
    assert_eq!(body["event"]["resolvedBy"], DEMO_EMAIL);

    let frame = rx.try_recv().expect("resolution should be broadcast");
    let message: serde_json::Value =
        serde_json::from_str(&frame).expect("frame should be JSON");
    assert_eq!(message["type"], "sos_resolved");
    assert_eq!(message["eventId"], 1);
    assert_eq!(message["device"]["sos"], false);
}

#[tokio::test]
async fn test_resolve_unknown_event_returns_404() {
    let state = test_state();
    let app = app(state.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/api/sos/99/resolve")
        .header(header::AUTHORIZATION, bearer_token(&state))
        .body(Body::empty())
        .expect("request should build");
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unresolve_reopens_event() {
    let state = test_state();
    let app = app(state.clone());
    report(&app, "dev1", 25.5, 91.9).await;
    let auth = bearer_token(&state);

    let resolve = Request::builder()
        .method("POST")
        .uri("/api/sos/1/resolve")
        .header(header::AUTHORIZATION, auth.clone())
        .body(Body::empty())
        .expect("request should build");
    let (status, _) = send(&app, resolve).await;
    assert_eq!(status, StatusCode::OK);

    let unresolve = Request::builder()
        .method("POST")
        .uri("/api/sos/1/unresolve")
        .header(header::AUTHORIZATION, auth)
        .body(Body::empty())
        .expect("request should build");
    let (status, body) = send(&app, unresolve).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["resolved"], false);
    assert!(body["event"].get("resolvedAt").is_none() || body["event"]["resolvedAt"].is_null());
}

// =============================================================================
// DEVICE ENDPOINTS
// =============================================================================

#[tokio::test]
async fn test_devices_requires_auth() {
    let app = app(test_state());
    let (status, _) = send(&app, get_request("/api/devices")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_devices_lists_known_devices() {
    let state = test_state();
    let app = app(state.clone());
    report(&app, "dev1", 25.5, 91.9).await;

    let request = Request::builder()
        .uri("/api/devices")
        .header(header::AUTHORIZATION, bearer_token(&state))
        .body(Body::empty())
        .expect("request should build");
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    let devices = body.as_array().expect("snapshot should be an array");
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["id"], "dev1");
    assert_eq!(devices[0]["sos"], true);
}

#[tokio::test]
async fn test_device_history_returns_track() {
    let state = test_state();
    let app = app(state.clone());
    report(&app, "dev1", 25.5, 91.9).await;

    let request = Request::builder()
        .uri("/api/devices/dev1/history")
        .header(header::AUTHORIZATION, bearer_token(&state))
        .body(Body::empty())
        .expect("request should build");
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    let points = body.as_array().expect("track should be an array");
    assert_eq!(points.len(), 31);
    assert!(points[0]["lat"].is_number());
}

#[tokio::test]
async fn test_device_history_unknown_returns_404() {
    let state = test_state();
    let app = app(state.clone());

    let request = Request::builder()
        .uri("/api/devices/ghost/history")
        .header(header::AUTHORIZATION, bearer_token(&state))
        .body(Body::empty())
        .expect("request should build");
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "device not found");
}
