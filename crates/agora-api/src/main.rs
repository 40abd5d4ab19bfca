//! Agora API Server
//!
//! REST API server for account registration, sign-in and session rotation.

use agora_api::{create_router, metrics, state::AppState};
use agora_core::config::{AppConfig, LoggingConfig};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "agora_api={level},agora_core={level},audit=info,tower_http=debug",
            level = logging.level
        )
        .into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Periodically drop sessions whose refresh token has expired
fn spawn_session_purge(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.auth.session_purge_interval_secs.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match state.sessions.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => {
                    metrics::SESSIONS_PURGED_TOTAL.inc_by(purged);
                    tracing::info!(purged, "Purged expired sessions");
                }
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    });
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    state.set_ready(false);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match std::env::var("AGORA_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    init_tracing(&config.logging);

    if config.auth.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET is not set; every token operation will fail");
    }
    if config.auth.google_client_id.is_none() {
        tracing::warn!("GOOGLE_CLIENT_ID is not set; Google sign-in is disabled");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::from_config(config).await?);
    spawn_session_purge(state.clone());

    // Create router
    let app = create_router(state.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Agora API Server starting on http://{}", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}
