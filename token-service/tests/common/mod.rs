//! Test helper module for token-service integration tests.
//!
//! Drives the real router over the in-memory store, which reproduces the
//! PostgreSQL store's non-blocking lock contract.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::util::ServiceExt;

use token_service::{
    build_router,
    config::{
        ApiConfig, CookieConfig, DatabaseConfig, Environment, JwtConfig, RateLimitConfig,
        SecurityConfig, TokenConfig,
    },
    middleware::create_token_rate_limiter,
    models::{RefreshToken, User},
    services::{self, JwtService, MemoryTokenStore, RefreshService, TokenStore},
    AppState,
};

pub const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub fn test_config() -> TokenConfig {
    TokenConfig {
        common: service_core::config::Config {
            port: 8080,
            shutdown_grace_seconds: 0,
        },
        environment: Environment::Dev,
        service_name: "token-service".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "error".to_string(),
        site_url: "http://localhost:3000".to_string(),
        database: DatabaseConfig {
            url: "postgres://localhost/unused_in_tests".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            issuer: "token-service".to_string(),
            aud: "authenticated".to_string(),
            exp_seconds: 3600,
        },
        security: SecurityConfig {
            refresh_token_rotation_enabled: true,
            refresh_token_reuse_interval: 10,
        },
        rate_limit: RateLimitConfig {
            header: None,
            token_refresh: 30,
        },
        cookie: CookieConfig {
            key: "sb".to_string(),
            duration_seconds: 86400,
        },
        api: ApiConfig {
            retry_loop_seconds: 5.0,
            retry_backoff_min_ms: 10,
            retry_backoff_max_ms: 30,
        },
    }
}

/// Test application with the full router wired over an in-memory store.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryTokenStore>,
    pub app: Router,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn with config tweaks (rotation flags, rate limits, ...).
    pub async fn spawn_with<F: FnOnce(&mut TokenConfig)>(tweak: F) -> Self {
        let mut config = test_config();
        tweak(&mut config);

        services::metering::init_metrics();

        let store = Arc::new(MemoryTokenStore::new());
        let store_dyn: Arc<dyn TokenStore> = store.clone();

        let jwt = JwtService::new(&config.jwt).expect("Failed to create JWT service");
        let refresh = RefreshService::new(
            store_dyn.clone(),
            jwt.clone(),
            config.security.clone(),
            config.api.clone(),
        );
        let token_rate_limiter = create_token_rate_limiter(config.rate_limit.token_refresh);

        let state = AppState {
            config: config.clone(),
            store: store_dyn,
            jwt,
            refresh,
            token_rate_limiter,
        };

        let app = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self { state, store, app }
    }

    pub async fn seed_user(&self, email: &str) -> User {
        let user = User::new(email, "authenticated");
        self.store
            .create_user(&user)
            .await
            .expect("Failed to seed user");
        user
    }

    /// Seed a user with a fresh session and root refresh token.
    pub async fn seed_user_with_token(&self, email: &str) -> (User, RefreshToken) {
        let user = self.seed_user(email).await;
        let token = self
            .store
            .grant_authenticated_user(&user)
            .await
            .expect("Failed to grant refresh token");
        (user, token)
    }

    pub async fn post_refresh(&self, refresh_token: &str) -> (StatusCode, HeaderMap, serde_json::Value) {
        let body = format!(r#"{{"refresh_token": "{}"}}"#, refresh_token);
        self.post_token_raw("/token?grant_type=refresh_token", body, &[])
            .await
    }

    pub async fn post_refresh_with_headers(
        &self,
        refresh_token: &str,
        headers: &[(&str, &str)],
    ) -> (StatusCode, HeaderMap, serde_json::Value) {
        let body = format!(r#"{{"refresh_token": "{}"}}"#, refresh_token);
        self.post_token_raw("/token?grant_type=refresh_token", body, headers)
            .await
    }

    pub async fn post_token_raw(
        &self,
        uri: &str,
        body: String,
        headers: &[(&str, &str)],
    ) -> (StatusCode, HeaderMap, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 8080))));

        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder.body(Body::from(body)).unwrap();

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

        (status, headers, json)
    }
}
