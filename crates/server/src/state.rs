//! Application state shared across handlers.

use std::sync::Arc;

use voice_gateway_config::remote::ConfigProvider;
use voice_gateway_config::Settings;
use voice_gateway_core::call::CallStore;
use voice_gateway_core::clock::{Clock, SystemClock};
use voice_gateway_outbound::pending::PendingStore;
use voice_gateway_outbound::telegram::ChatSink;
use voice_gateway_outbound::OutboundCommander;
use voice_gateway_pipeline::auto_press::AutoPressRateLimiter;
use voice_gateway_telephony::TelephonyClient;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub clock: Arc<dyn Clock>,
    pub calls: Arc<CallStore>,
    pub config: Arc<ConfigProvider>,
    pub telephony: TelephonyClient,
    pub rate_limiter: Arc<AutoPressRateLimiter>,
    /// Command bot, present when the outbound channel is configured.
    pub commander: Option<Arc<OutboundCommander>>,
    /// Reply channel for the command bot.
    pub outbound_sink: Option<ChatSink>,
    /// Inbound call-log sink (transcripts, recordings).
    pub log_sink: Option<ChatSink>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let config = Arc::new(ConfigProvider::new(
            settings.config_url.clone(),
            settings.config_ttl,
            voice_gateway_config::voice::DEFAULT_ASSISTANT_NAME,
        ));

        let telephony = TelephonyClient::new(
            settings.twilio_account_sid.clone(),
            settings.twilio_auth_token.clone(),
        );

        let rate_limiter = Arc::new(AutoPressRateLimiter::new(
            clock.clone(),
            settings.auto_press_rate_limit,
        ));

        let outbound_sink = settings
            .telegram_outbound_bot_token
            .as_ref()
            .zip(settings.telegram_outbound_chat_id.as_ref())
            .map(|(token, chat)| ChatSink::new(token, chat));

        let log_sink = settings
            .telegram_bot_token
            .as_ref()
            .zip(settings.telegram_chat_id.as_ref())
            .map(|(token, chat)| ChatSink::new(token, chat));

        let commander = settings
            .telegram_outbound_allowed_chat_id
            .as_ref()
            .and_then(|id| id.parse::<i64>().ok())
            .map(|allowed| {
                Arc::new(OutboundCommander::new(
                    config.clone(),
                    telephony.clone(),
                    PendingStore::new(settings.outbound_code_ttl),
                    settings.twilio_outbound_from.clone(),
                    settings.webhook_url.clone(),
                    Some(allowed),
                    settings.telegram_outbound_webhook_secret.clone(),
                ))
            });

        Self {
            settings,
            clock,
            calls: Arc::new(CallStore::new()),
            config,
            telephony,
            rate_limiter,
            commander,
            outbound_sink,
            log_sink,
        }
    }
}
