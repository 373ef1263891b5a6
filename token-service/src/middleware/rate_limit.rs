use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use service_core::error::AppError;
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

use crate::config::RateLimitConfig;
use crate::AppState;

/// Token-bucket limiter keyed by a request-derived string (trust header
/// value, falling back to the remote address). Process-wide, not
/// persisted; a restart drops all buckets.
pub type KeyedRateLimiter = Arc<RateLimiter<String, DashMapStateStore<String>, DefaultClock>>;

/// Bucket with capacity `requests_per_minute` refilling at the same rate,
/// so a full minute's quota may be spent as one burst.
pub fn create_token_rate_limiter(requests_per_minute: u32) -> KeyedRateLimiter {
    let rate = requests_per_minute.max(1);
    let quota = Quota::with_period(Duration::from_millis(60_000 / rate as u64))
        .unwrap()
        .allow_burst(NonZeroU32::new(rate).unwrap());

    Arc::new(RateLimiter::dashmap(quota))
}

/// Per-endpoint rate limiting for `/token`. Runs before body validation;
/// an otherwise-invalid request still consumes from its bucket.
pub async fn token_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = match rate_limit_key(&state.config.rate_limit, &request) {
        Some(key) => key,
        None => {
            // No trust header and no peer address (e.g. a unix socket);
            // proceed rather than collapsing everything into one bucket.
            tracing::warn!("Could not determine rate limit key for request");
            return next.run(request).await;
        }
    };

    match state.token_rate_limiter.check_key(&key) {
        Ok(_) => next.run(request).await,
        Err(negative) => {
            let wait_time = negative.wait_time_from(DefaultClock::default().now());
            AppError::TooManyRequests(
                "Too many requests. Please try again later.".to_string(),
                Some(wait_time.as_secs()),
            )
            .into_response()
        }
    }
}

/// Bucket key: the configured header's value when present, otherwise the
/// remote address. `X-Forwarded-For` is never consulted unless it is the
/// header explicitly configured.
fn rate_limit_key(config: &RateLimitConfig, request: &Request) -> Option<String> {
    if let Some(header_name) = &config.header {
        if let Some(value) = request
            .headers()
            .get(header_name)
            .and_then(|v| v.to_str().ok())
        {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}
