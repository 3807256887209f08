//! Voice selection.
//!
//! The session voice is locked at call start. The operator default applies
//! unless the matched VIP carries an override; overrides outside the allowed
//! set fall back to the default. An explicit VIP override also renames the
//! assistant to the title-cased voice name for that call.

use crate::remote::VipRecord;
use crate::settings::Settings;

/// Voices the realtime model accepts. Anything else falls back to default.
pub const ALLOWED_VOICES: &[&str] = &[
    "marin", "cedar", "alloy", "ash", "ballad", "coral", "echo", "sage", "shimmer", "verse",
];

pub const DEFAULT_ASSISTANT_NAME: &str = "Trinity";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChoice {
    pub voice: String,
    pub assistant_name: String,
}

/// Resolve the voice and spoken assistant name for a call.
pub fn select_voice(settings: &Settings, vip: Option<&VipRecord>) -> VoiceChoice {
    let default = normalize(&settings.default_voice).unwrap_or_else(|| "marin".to_string());

    let override_voice = vip
        .and_then(|v| v.voice_override.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|raw| match raw.to_ascii_lowercase().as_str() {
            // Legacy directory values map to the configured defaults.
            "male" => normalize(&settings.male_voice),
            "female" => normalize(&settings.default_voice),
            other => normalize(other),
        });

    match override_voice {
        Some(voice) => {
            let assistant_name = title_case(&voice);
            VoiceChoice {
                voice,
                assistant_name,
            }
        }
        None => VoiceChoice {
            voice: default,
            assistant_name: DEFAULT_ASSISTANT_NAME.to_string(),
        },
    }
}

fn normalize(raw: &str) -> Option<String> {
    let lower = raw.trim().to_ascii_lowercase();
    ALLOWED_VOICES.contains(&lower.as_str()).then_some(lower)
}

fn title_case(voice: &str) -> String {
    let mut chars = voice.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
