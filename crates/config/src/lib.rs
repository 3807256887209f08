//! Voice Gateway Configuration
//!
//! Environment-driven settings, the cached remote operator config (system
//! prompt, VIP directory, business list), voice selection, and the per-call
//! instruction builder.

pub mod instructions;
pub mod remote;
pub mod settings;
pub mod voice;

pub use instructions::{build_instructions, CallContext, OutboundContext};
pub use remote::{ConfigProvider, OperatorConfig, VipRecord};
pub use settings::Settings;
pub use voice::{select_voice, VoiceChoice, ALLOWED_VOICES};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("config payload invalid: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("no config url configured")]
    Unconfigured,
}
