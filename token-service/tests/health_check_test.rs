mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::TestApp;
use tower::util::ServiceExt;

async fn get(app: &TestApp, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::spawn().await;

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("ok"));
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_login_counter() {
    let app = TestApp::spawn().await;
    let (_user, root) = app.seed_user_with_token("metrics@example.com").await;

    let (status, _, _) = app.post_refresh(&root.token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("logins_total"));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = TestApp::spawn().await;

    let (status, body) = get(&app, "/.well-known/openapi.json").await;
    assert_eq!(status, StatusCode::OK);

    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(doc["paths"]["/token"]["post"].is_object());
}

#[tokio::test]
async fn test_responses_carry_security_and_request_id_headers() {
    let app = TestApp::spawn().await;

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header("x-request-id", "test-request-id")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "test-request-id"
    );
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}
