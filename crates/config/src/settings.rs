//! Environment settings.
//!
//! Everything is configured through the environment (a `.env` file is honored
//! in development). Invalid numeric values fall back to the default with a
//! warning; only genuinely required secrets are surfaced as `None` and
//! checked where they are used.

use std::time::Duration;

/// All recognized environment keys, parsed once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    // Model session
    pub openai_api_key: String,
    pub realtime_model: String,
    pub default_voice: String,
    pub male_voice: String,

    // Remote operator config
    pub config_url: Option<String>,
    pub config_ttl: Duration,

    // Idle watchdog
    pub idle_hangup: Duration,
    pub idle_send_goodbye: bool,
    pub idle_goodbye_line: String,

    // Number-mode
    pub number_silence_grace: Duration,
    pub number_min_digits: usize,

    // Auto-press / DNC
    pub auto_dnc_enable: bool,
    pub auto_dnc_on_cnam: bool,
    pub auto_dnc_only_on_phrase: bool,
    pub auto_dnc_digits: Vec<char>,
    pub auto_dnc_gap: Duration,
    pub auto_press_confidence: f64,
    pub auto_press_rate_limit: Duration,
    pub dnc_hangup_after: bool,
    pub dnc_say_line: String,

    // Telephony provider
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_outbound_from: String,
    /// Public HTTPS base for webhooks and the media socket.
    pub webhook_url: String,

    // Chat sinks: inbound call log sink and the outbound command bot are
    // distinct bots with distinct chats.
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_tz: Option<String>,
    pub telegram_outbound_bot_token: Option<String>,
    pub telegram_outbound_chat_id: Option<String>,
    pub telegram_outbound_allowed_chat_id: Option<String>,
    pub telegram_outbound_webhook_path: String,
    pub telegram_outbound_webhook_secret: Option<String>,

    pub outbound_code_ttl: Duration,
    pub port: u16,
}

impl Settings {
    /// Load from the process environment, honoring a `.env` file if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            openai_api_key: var("OPENAI_API_KEY").unwrap_or_default(),
            realtime_model: var("OPENAI_REALTIME_MODEL")
                .unwrap_or_else(|| "gpt-realtime".into()),
            default_voice: var("DEFAULT_VOICE").unwrap_or_else(|| "marin".into()),
            male_voice: var("MALE_VOICE").unwrap_or_else(|| "cedar".into()),

            config_url: var("GOOGLE_CONFIG_URL"),
            config_ttl: Duration::from_millis(parse_or("CONFIG_TTL_MS", 20_000)),

            idle_hangup: Duration::from_secs(parse_or("IDLE_HANGUP_SECS", 180)),
            idle_send_goodbye: flag_or("IDLE_SEND_GOODBYE", true),
            idle_goodbye_line: var("IDLE_GOODBYE_LINE").unwrap_or_else(|| {
                "It's been quiet for a while, so I'll let you go. Bye for now!".into()
            }),

            number_silence_grace: Duration::from_millis(parse_or("NUMBER_SILENCE_GRACE_MS", 2500)),
            number_min_digits: parse_or("NUMBER_MIN_DIGITS", 10u64) as usize,

            auto_dnc_enable: flag_or("AUTO_DNC_ENABLE", true),
            auto_dnc_on_cnam: flag_or("AUTO_DNC_ON_CNAM", true),
            auto_dnc_only_on_phrase: flag_or("AUTO_DNC_ONLY_ON_PHRASE", false),
            auto_dnc_digits: parse_digits(var("AUTO_DNC_DIGITS").as_deref().unwrap_or("9,8")),
            auto_dnc_gap: Duration::from_millis(parse_or("AUTO_DNC_GAP_MS", 1000)),
            auto_press_confidence: parse_f64_or("AUTO_PRESS_CONFIDENCE", 0.90),
            auto_press_rate_limit: Duration::from_secs(parse_or(
                "AUTO_PRESS_RATE_LIMIT_SECS",
                6 * 60 * 60,
            )),
            dnc_hangup_after: flag_or("DNC_HANGUP_AFTER", true),
            dnc_say_line: var("DNC_SAY_LINE")
                .unwrap_or_else(|| "Please remove this number from your list.".into()),

            twilio_account_sid: var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_outbound_from: var("TWILIO_OUTBOUND_FROM").unwrap_or_default(),
            webhook_url: var("WEBHOOK_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_default(),

            telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: var("TELEGRAM_CHAT_ID"),
            telegram_tz: var("TELEGRAM_TZ"),
            telegram_outbound_bot_token: var("TELEGRAM_OUTBOUND_BOT_TOKEN"),
            telegram_outbound_chat_id: var("TELEGRAM_OUTBOUND_CHAT_ID"),
            telegram_outbound_allowed_chat_id: var("TELEGRAM_OUTBOUND_ALLOWED_CHAT_ID"),
            telegram_outbound_webhook_path: var("TELEGRAM_OUTBOUND_WEBHOOK_PATH")
                .unwrap_or_else(|| "/telegram/outbound".into()),
            telegram_outbound_webhook_secret: var("TELEGRAM_OUTBOUND_WEBHOOK_SECRET"),

            outbound_code_ttl: Duration::from_millis(parse_or("OUTBOUND_CODE_TTL_MS", 120_000)),
            port: parse_or("PORT", 8080u64) as u16,
        }
    }

    /// Media socket URL the TwiML points the provider at.
    pub fn media_socket_url(&self) -> String {
        format!(
            "{}/media",
            self.webhook_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        )
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or(key: &str, default: u64) -> u64 {
    match var(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default, "unparseable setting, using default");
            default
        }),
        None => default,
    }
}

fn parse_f64_or(key: &str, default: f64) -> f64 {
    match var(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default, "unparseable setting, using default");
            default
        }),
        None => default,
    }
}

fn flag_or(key: &str, default: bool) -> bool {
    match var(key) {
        Some(raw) => matches!(raw.trim(), "1" | "true" | "TRUE" | "yes" | "on"),
        None => default,
    }
}

fn parse_digits(raw: &str) -> Vec<char> {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_sequences_parse() {
        assert_eq!(parse_digits("9,8"), vec!['9', '8']);
        assert_eq!(parse_digits("2"), vec!['2']);
        assert!(parse_digits("none").is_empty());
    }

    #[test]
    fn flags_accept_common_spellings() {
        std::env::set_var("VG_TEST_FLAG", "yes");
        assert!(flag_or("VG_TEST_FLAG", false));
        std::env::set_var("VG_TEST_FLAG", "0");
        assert!(!flag_or("VG_TEST_FLAG", true));
        std::env::remove_var("VG_TEST_FLAG");
        assert!(flag_or("VG_TEST_FLAG", true));
    }

    #[test]
    fn bad_numbers_fall_back() {
        std::env::set_var("VG_TEST_NUM", "not-a-number");
        assert_eq!(parse_or("VG_TEST_NUM", 42), 42);
        std::env::set_var("VG_TEST_NUM", "7");
        assert_eq!(parse_or("VG_TEST_NUM", 42), 7);
        std::env::remove_var("VG_TEST_NUM");
    }
}
