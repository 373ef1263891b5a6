mod common;

use axum::http::StatusCode;
use common::TestApp;

#[tokio::test]
async fn test_rate_limit_token_refresh_by_custom_header() {
    let app = TestApp::spawn_with(|config| {
        config.rate_limit.header = Some("My-Custom-Header".to_string());
        config.rate_limit.token_refresh = 30;
    })
    .await;

    // The first 30 requests pass the limiter; they still fail body parsing
    // with 400 because the body is empty, which is fine - rejection comes
    // before validation, not after.
    for i in 0..30 {
        let (status, _, _) = app
            .post_token_raw(
                "/token?grant_type=refresh_token",
                String::new(),
                &[("My-Custom-Header", "1.2.3.4")],
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "request {} was limited early", i + 1);
    }

    let (status, headers, _) = app
        .post_token_raw(
            "/token?grant_type=refresh_token",
            String::new(),
            &[("My-Custom-Header", "1.2.3.4")],
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key(axum::http::header::RETRY_AFTER));

    // A different header value gets its own bucket.
    let (status, _, _) = app
        .post_token_raw(
            "/token?grant_type=refresh_token",
            String::new(),
            &[("My-Custom-Header", "5.6.7.8")],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rate_limit_falls_back_to_remote_address() {
    let app = TestApp::spawn_with(|config| {
        config.rate_limit.header = None;
        config.rate_limit.token_refresh = 2;
    })
    .await;

    // All requests share the injected peer address.
    for _ in 0..2 {
        let (status, _, _) = app
            .post_token_raw("/token?grant_type=refresh_token", String::new(), &[])
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _, _) = app
        .post_token_raw("/token?grant_type=refresh_token", String::new(), &[])
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limit_rejects_before_touching_the_store() {
    let app = TestApp::spawn_with(|config| {
        config.rate_limit.header = Some("My-Custom-Header".to_string());
        config.rate_limit.token_refresh = 1;
    })
    .await;
    let (_user, root) = app.seed_user_with_token("limited@example.com").await;

    // Burn the bucket with an invalid request.
    let (status, _, _) = app
        .post_token_raw(
            "/token?grant_type=refresh_token",
            String::new(),
            &[("My-Custom-Header", "1.2.3.4")],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A perfectly valid refresh is now limited, and no swap happened.
    let (status, _, _) = app
        .post_refresh_with_headers(&root.token, &[("My-Custom-Header", "1.2.3.4")])
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    assert!(!app.store.find_refresh_token(&root.token).unwrap().revoked);
}

#[tokio::test]
async fn test_other_routes_are_not_rate_limited() {
    let app = TestApp::spawn_with(|config| {
        config.rate_limit.token_refresh = 1;
    })
    .await;

    let (status, _, _) = app
        .post_token_raw("/token?grant_type=refresh_token", String::new(), &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The limiter is scoped to the token endpoint.
    for _ in 0..5 {
        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/health")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = tower::util::ServiceExt::oneshot(app.app.clone(), request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
