//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, build_test_app, get, Backend};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with expected JSON fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let app = build_test_app(Backend::WriteImage, 1);
    let response = get(app.router.clone(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = build_test_app(Backend::WriteImage, 1);
    let response = get(app.router.clone(), "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: GET on /generate is not allowed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_generate_is_method_not_allowed() {
    let app = build_test_app(Backend::WriteImage, 1);
    let response = get(app.router.clone(), "/generate").await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = build_test_app(Backend::WriteImage, 1);
    let response = get(app.router.clone(), "/health").await;

    let id_str = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header")
        .to_str()
        .unwrap();
    assert_eq!(id_str.len(), 36);
}

// ---------------------------------------------------------------------------
// Test: a client-supplied x-request-id is echoed back
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_request_id_is_propagated() {
    let app = build_test_app(Backend::WriteImage, 1);
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

// ---------------------------------------------------------------------------
// Test: CORS preflight is answered for any origin
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_allows_post() {
    let app = build_test_app(Backend::WriteImage, 1);
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/generate")
        .header("origin", "http://example.com")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}
