use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;

use token_service::{
    build_router,
    config::TokenConfig,
    db, init_tracing,
    middleware::create_token_rate_limiter,
    services::{self, JwtService, PgTokenStore, RefreshService, TokenStore},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration - fail fast if invalid
    let config = TokenConfig::from_env()?;

    init_tracing(&config);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting token service"
    );

    services::metering::init_metrics();

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let store: Arc<dyn TokenStore> = Arc::new(PgTokenStore::new(pool));
    let jwt = JwtService::new(&config.jwt)?;
    let refresh = RefreshService::new(
        store.clone(),
        jwt.clone(),
        config.security.clone(),
        config.api.clone(),
    );
    let token_rate_limiter = create_token_rate_limiter(config.rate_limit.token_refresh);

    let state = AppState {
        config: config.clone(),
        store,
        jwt,
        refresh,
        token_rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.common.shutdown_grace_seconds))
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal(grace_seconds: u64) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // Keep the listener open while upstream load balancers drain us.
    tokio::time::sleep(tokio::time::Duration::from_secs(grace_seconds)).await;
}
