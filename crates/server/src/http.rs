//! Router.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::media;
use crate::state::AppState;
use crate::webhooks;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let outbound_path = state.settings.telegram_outbound_webhook_path.clone();

    Router::new()
        // Telephony media socket
        .route("/media", get(media::handle_media_upgrade))
        // Provider callbacks
        .route("/transcript", post(webhooks::handle_transcript))
        .route("/recording", post(webhooks::handle_recording))
        .route("/twiml/outbound", post(webhooks::outbound_twiml))
        .route("/call-status", post(webhooks::call_status))
        // Chat-bot command channel
        .route(&outbound_path, post(webhooks::handle_outbound_command))
        // Health check
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_gateway_config::Settings;

    #[test]
    fn test_router_creation() {
        let state = AppState::new(Settings::from_env());
        let _ = create_router(state);
    }
}
