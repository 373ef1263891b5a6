mod common;

use axum::http::StatusCode;
use common::TestApp;
use std::collections::HashSet;
use token_service::services::{TokenStore, TokenStoreTx};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refreshes_issue_exactly_one_child() {
    let app = TestApp::spawn().await;
    let (_user, root) = app.seed_user_with_token("concurrent@example.com").await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let app_clone = app.app.clone();
        let token = root.token.clone();
        handles.push(tokio::spawn(async move {
            let body = format!(r#"{{"refresh_token": "{}"}}"#, token);
            let request = axum::http::Request::builder()
                .method("POST")
                .uri("/token?grant_type=refresh_token")
                .header("Content-Type", "application/json")
                .extension(axum::extract::ConnectInfo(std::net::SocketAddr::from((
                    [127, 0, 0, 1],
                    8080,
                ))))
                .body(axum::body::Body::from(body))
                .unwrap();

            let response = tower::util::ServiceExt::oneshot(app_clone, request)
                .await
                .unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            (status, json)
        }));
    }

    let mut refresh_tokens = HashSet::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        refresh_tokens.insert(body["refresh_token"].as_str().unwrap().to_string());
    }

    // Exactly one swap won; every response carries the same child token.
    assert_eq!(refresh_tokens.len(), 1);
    let child = refresh_tokens.into_iter().next().unwrap();
    assert_ne!(child, root.token);

    let tokens = app
        .store
        .session_refresh_tokens(root.session_id)
        .await
        .unwrap();
    assert_eq!(tokens.len(), 2, "only one swap row may be written");
    assert_eq!(tokens.iter().filter(|t| !t.revoked).count(), 1);
}

#[tokio::test]
async fn test_exhausted_retry_budget_returns_conflict() {
    let app = TestApp::spawn_with(|config| {
        // Keep the test fast: a tiny wall-clock budget with the default
        // jittered backoff.
        config.api.retry_loop_seconds = 0.2;
    })
    .await;
    let (_user, root) = app.seed_user_with_token("locked@example.com").await;

    // Park a transaction on the session so every iteration sees contention.
    let mut blocker = app.state.store.begin().await.unwrap();
    blocker
        .find_user_with_refresh_token_for_update(&root.token)
        .await
        .unwrap();

    let (status, _, body) = app.post_refresh(&root.token).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"],
        "Too many concurrent token refresh requests on the same session or refresh token"
    );

    blocker.rollback().await.unwrap();

    // Once the lock is released the refresh goes through.
    let (status, _, _) = app.post_refresh(&root.token).await;
    assert_eq!(status, StatusCode::OK);
}
