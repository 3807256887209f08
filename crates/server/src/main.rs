//! Voice Gateway entry point.

use std::net::SocketAddr;

use voice_gateway_config::Settings;
use voice_gateway_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = Settings::from_env();
    tracing::info!("Starting Voice Gateway v{}", env!("CARGO_PKG_VERSION"));

    if settings.openai_api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is unset; model sessions will fail to connect");
    }
    if settings.webhook_url.is_empty() {
        tracing::warn!("WEBHOOK_URL is unset; TwiML callbacks will not resolve");
    }

    let state = AppState::new(settings.clone());

    // Warm the operator config so the first call has a directory.
    let provider = state.config.clone();
    tokio::spawn(async move { provider.refresh().await });

    tracing::info!(
        outbound_bot = state.commander.is_some(),
        log_sink = state.log_sink.is_some(),
        "Initialized application state"
    );

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_gateway=info,tower_http=info".into()),
        )
        .init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
