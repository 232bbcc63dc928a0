use service_core::error::AppError;
use service_core::observability::{init_tracing, shutdown_tracing};
use sso_service::{
    build_router,
    config::SsoConfig,
    models::Application,
    services::{Database, RedisService},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = SsoConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting sso service"
    );

    let database = Database::connect(&config.database).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to connect to PostgreSQL");
        AppError::InternalError(anyhow::anyhow!("Database connection failed: {}", e))
    })?;
    database.migrate().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to run migrations");
        AppError::InternalError(anyhow::anyhow!("Database migration failed: {}", e))
    })?;

    let redis = RedisService::new(&config.redis).await?;

    let state = AppState::new(
        config.clone(),
        Arc::new(database),
        Arc::new(redis),
    );

    let app = Application::new(
        config.application.app_id,
        config.application.app_name.clone(),
        config.application.signing_secret.clone(),
    )
    .ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!(
            "APP_ID, APP_NAME and APP_SECRET must describe a valid application"
        ))
    })?;
    state.auth_service.ensure_application(&app).await?;

    let router = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown_tracing();
    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
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
}
