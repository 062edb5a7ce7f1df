use identity_service::{
    build_router,
    config::AuthConfig,
    services::{
        google::google_verifier_from,
        notifier::{sms_gateway_from, welcome_notifier_from},
        MongoDb, SystemClock,
    },
    AppState,
};
use service_core::observability::{init_metrics, init_tracing};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Fail fast on bad configuration
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let db = MongoDb::connect(
        &config.mongodb.uri,
        &config.mongodb.database,
        Duration::from_secs(config.mongodb.timeout_seconds),
    )
    .await?;
    db.initialize_indexes().await?;
    tracing::info!(database = %config.mongodb.database, "Database initialized");
    let db = Arc::new(db);

    let notifier = welcome_notifier_from(&config.notification)?;
    let sms = sms_gateway_from(&config.sms)?;
    let google = google_verifier_from(&config.google)?;
    tracing::info!(
        notifications = config.notification.enabled,
        sms = config.sms.enabled,
        google = config.google.client_id.is_some(),
        "Collaborators initialized"
    );

    let state = AppState::new(
        config.clone(),
        db.clone(),
        db,
        notifier,
        sms,
        google,
        Arc::new(SystemClock),
    )?;
    let app = build_router(state)?;

    let addr = config.common.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
