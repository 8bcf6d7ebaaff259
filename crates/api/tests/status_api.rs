//! Integration tests for `GET /status`.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post_json, Backend};
use serde_json::json;

#[tokio::test]
async fn status_reports_public_configuration() {
    let app = build_test_app(Backend::WriteImage, 3);

    let response = get(app.router.clone(), "/status").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let public = &body["public_configuration"];
    assert_eq!(public["api_version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(public["max_queue_size"], 3);
    assert_eq!(public["current_workflow"], "flux-dev-simple");
    assert_eq!(body["job_queue"], 0);
}

#[tokio::test]
async fn status_counts_running_job() {
    let app = build_test_app(Backend::Hold, 3);

    let pending = tokio::spawn(post_json(
        app.router.clone(),
        "/generate",
        json!({"prompt": "a cat"}),
    ));
    app.runner.wait_for_calls(1).await;

    let body = body_json(get(app.router.clone(), "/status").await).await;
    assert_eq!(body["job_queue"], 1);

    app.runner.release();
    assert_eq!(pending.await.unwrap().status(), StatusCode::OK);

    let body = body_json(get(app.router.clone(), "/status").await).await;
    assert_eq!(body["job_queue"], 0);
}

#[tokio::test]
async fn status_has_no_side_effects() {
    let app = build_test_app(Backend::WriteImage, 3);

    for _ in 0..3 {
        get(app.router.clone(), "/status").await;
    }
    assert_eq!(app.queue_len(), 0);
    assert_eq!(app.runner.calls(), 0);
}
