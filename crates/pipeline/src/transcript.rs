//! Transcript integration.
//!
//! Utterances arrive over the provider's transcription side-channel, tagged
//! by track. We classify them, drop the assistant's recorded greeting (it is
//! already known), and at end of call render an interleaved timeline with
//! same-speaker runs coalesced.

use serde::Deserialize;
use voice_gateway_core::transcript::{Role, TranscriptEvent};

/// Adjacent same-role entries within this gap merge into one turn.
const COALESCE_GAP_MS: u64 = 2000;

/// Normalized prefixes of the greeting the assistant reads at call start.
/// The transcription echoes them back; we don't log them twice.
const GREETING_MARKERS: &[&str] = &[
    "this is trinity",
    "it's trinity",
    "dan hasn't picked up",
    "dan's vip assistant",
    "dan's vip ai assistant",
];

/// Structured transcription payload (a JSON string field in the callback).
#[derive(Debug, Deserialize)]
struct TranscriptionData {
    #[serde(default)]
    transcript: Option<String>,
}

/// Map the provider track to a speaker role.
pub fn classify_track(track: &str) -> Option<Role> {
    match track {
        "inbound_track" => Some(Role::Caller),
        "outbound_track" => Some(Role::Assistant),
        other => {
            tracing::debug!(track = other, "unknown transcription track dropped");
            None
        }
    }
}

/// Pull the utterance text out of the callback: structured JSON first,
/// plain-text field as fallback.
pub fn extract_text(data_json: Option<&str>, plain: Option<&str>) -> Option<String> {
    if let Some(raw) = data_json {
        if let Ok(data) = serde_json::from_str::<TranscriptionData>(raw) {
            if let Some(text) = data.transcript.filter(|t| !t.trim().is_empty()) {
                return Some(text.trim().to_string());
            }
        }
    }
    plain
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Does this assistant utterance echo the recorded greeting?
pub fn is_recorded_greeting(text: &str) -> bool {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '\'')
        .collect();
    GREETING_MARKERS.iter().any(|m| normalized.contains(m))
}

/// Render the interleaved timeline: sort by timestamp, coalesce adjacent
/// same-role entries within the gap, one `Role:\n text` block per turn.
pub fn render_timeline(events: &[TranscriptEvent]) -> String {
    let mut sorted: Vec<&TranscriptEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.ts_ms);

    let mut blocks: Vec<String> = Vec::new();
    let mut current: Option<(Role, String, u64)> = None;

    for event in sorted {
        match current.take() {
            Some((role, mut text, last_ts))
                if role == event.role && event.ts_ms.saturating_sub(last_ts) <= COALESCE_GAP_MS =>
            {
                if !text.ends_with('-') {
                    text.push(' ');
                }
                text.push_str(&event.text);
                current = Some((role, text, event.ts_ms));
            }
            Some((role, text, _)) => {
                blocks.push(format!("{}:\n{}", role.display(), text));
                current = Some((event.role, event.text.clone(), event.ts_ms));
            }
            None => {
                current = Some((event.role, event.text.clone(), event.ts_ms));
            }
        }
    }
    if let Some((role, text, _)) = current {
        blocks.push(format!("{}:\n{}", role.display(), text));
    }

    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(role: Role, text: &str, ts_ms: u64) -> TranscriptEvent {
        TranscriptEvent {
            role,
            text: text.into(),
            ts_ms,
        }
    }

    #[test]
    fn tracks_classify() {
        assert_eq!(classify_track("inbound_track"), Some(Role::Caller));
        assert_eq!(classify_track("outbound_track"), Some(Role::Assistant));
        assert_eq!(classify_track("media_track"), None);
    }

    #[test]
    fn structured_payload_wins_over_plain() {
        let text = extract_text(Some(r#"{"transcript":"hello there","confidence":0.9}"#), Some("fallback"));
        assert_eq!(text.as_deref(), Some("hello there"));
    }

    #[test]
    fn plain_text_fallback() {
        assert_eq!(extract_text(None, Some(" hi ")).as_deref(), Some("hi"));
        assert_eq!(extract_text(Some("{not json"), Some("hi")).as_deref(), Some("hi"));
        assert!(extract_text(Some(r#"{"transcript":""}"#), None).is_none());
    }

    #[test]
    fn greeting_echo_detected() {
        assert!(is_recorded_greeting("Hi Jeff — This is Trinity, Dan's VIP Assistant."));
        assert!(is_recorded_greeting("dan hasn't picked up yet. how can I help?"));
        assert!(!is_recorded_greeting("Sure, I can pass that along."));
    }

    #[test]
    fn coalesces_same_role_within_gap() {
        let events = vec![
            ev(Role::Caller, "hi can you", 1000),
            ev(Role::Caller, "hear me", 2500),
            ev(Role::Assistant, "Loud and clear.", 6000),
        ];
        let out = render_timeline(&events);
        assert_eq!(out, "Caller:\nhi can you hear me\n\nAssistant:\nLoud and clear.");
    }

    #[test]
    fn hyphen_join_omits_space() {
        let events = vec![
            ev(Role::Caller, "my account is A-", 1000),
            ev(Role::Caller, "42", 1500),
        ];
        let out = render_timeline(&events);
        assert_eq!(out, "Caller:\nmy account is A-42");
    }

    #[test]
    fn gap_splits_same_role_into_turns() {
        let events = vec![
            ev(Role::Caller, "first thought", 1000),
            ev(Role::Caller, "second thought", 5000),
        ];
        let out = render_timeline(&events);
        assert_eq!(out, "Caller:\nfirst thought\n\nCaller:\nsecond thought");
    }

    #[test]
    fn unsorted_input_renders_in_time_order() {
        let events = vec![
            ev(Role::Assistant, "answer", 9000),
            ev(Role::Caller, "question", 1000),
        ];
        let out = render_timeline(&events);
        assert!(out.starts_with("Caller:"));
    }
}
