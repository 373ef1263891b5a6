//! Token Service
//!
//! Refresh-token rotation core of the authentication stack: exchanges a
//! refresh token for a fresh access token (and usually a rotated refresh
//! token) under adversarial and concurrent conditions. Token families,
//! reuse-interval grace, family-wide revocation on abuse, and per-header
//! rate limiting.

pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use crate::config::TokenConfig;
use crate::middleware::{token_rate_limit_middleware, KeyedRateLimiter};
use crate::services::{JwtService, RefreshService, TokenStore};
use service_core::error::AppError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: TokenConfig,
    pub store: Arc<dyn TokenStore>,
    pub jwt: JwtService,
    pub refresh: RefreshService,
    pub token_rate_limiter: KeyedRateLimiter,
}

#[derive(OpenApi)]
#[openapi(
    paths(handlers::token::token_grant),
    components(schemas(
        dtos::RefreshTokenGrantParams,
        dtos::AccessTokenResponse,
        dtos::ErrorResponse,
        dtos::OAuthErrorResponse,
        models::SanitizedUser,
    )),
    tags(
        (name = "Token", description = "Refresh-token grant endpoint")
    )
)]
pub struct ApiDoc;

/// Build the application router.
pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let token_routes = Router::new()
        .route("/token", post(handlers::token::token_grant))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            token_rate_limit_middleware,
        ));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/.well-known/openapi.json", get(handlers::well_known::openapi))
        .merge(token_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            service_core::middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(
            service_core::middleware::request_id_middleware,
        ));

    Ok(app)
}

async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state
        .store
        .health_check()
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn metrics() -> Result<String, AppError> {
    services::metering::gather().map_err(AppError::InternalError)
}

/// Initialize tracing/logging from the configured log level. JSON output,
/// overridable via `RUST_LOG`.
pub fn init_tracing(config: &TokenConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
