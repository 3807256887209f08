//! Server events from the model socket.
//!
//! The wire tags are dotted strings; both the current and the legacy audio
//! delta / completion tags map to the same variants. Unknown events are
//! dropped by the caller after a debug log.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ModelEvent {
    #[serde(rename = "session.updated")]
    SessionUpdated,

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// Base64 μ-law audio from the assistant.
    #[serde(rename = "response.audio.delta", alias = "response.output_audio.delta")]
    AudioDelta {
        #[serde(default, alias = "audio")]
        delta: String,
    },

    /// Assistant transcript text, streamed alongside the audio.
    #[serde(
        rename = "response.audio_transcript.delta",
        alias = "response.output_audio_transcript.delta"
    )]
    TranscriptDelta {
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "response.done", alias = "response.completed")]
    ResponseDone,

    #[serde(rename = "output_audio_buffer.cleared")]
    OutputCleared,

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ErrorBody,
    },

    /// Raw binary frames off the socket (PCM16 @ 16 kHz fallback delivery).
    /// Never produced by JSON parsing.
    #[serde(skip)]
    BinaryAudio(Vec<u8>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl ModelEvent {
    /// Parse one socket message. `None` covers both malformed JSON and event
    /// types this bridge doesn't care about.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<ModelEvent>(text) {
            Ok(ev) => Some(ev),
            Err(_) => {
                // Either malformed or an event type we don't handle; pull the
                // tag out for the log without failing the call.
                let tag = serde_json::from_str::<serde_json::Value>(text)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from));
                match tag {
                    Some(tag) => tracing::trace!(event = %tag, "unhandled model event dropped"),
                    None => tracing::debug!("malformed model event dropped"),
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lifecycle_events() {
        assert!(matches!(
            ModelEvent::parse(r#"{"type":"session.updated","session":{}}"#),
            Some(ModelEvent::SessionUpdated)
        ));
        assert!(matches!(
            ModelEvent::parse(r#"{"type":"input_audio_buffer.speech_started"}"#),
            Some(ModelEvent::SpeechStarted)
        ));
        assert!(matches!(
            ModelEvent::parse(r#"{"type":"response.done","response":{}}"#),
            Some(ModelEvent::ResponseDone)
        ));
    }

    #[test]
    fn audio_delta_accepts_both_tags_and_fields() {
        match ModelEvent::parse(r#"{"type":"response.audio.delta","delta":"QUJD"}"#) {
            Some(ModelEvent::AudioDelta { delta }) => assert_eq!(delta, "QUJD"),
            other => panic!("unexpected: {other:?}"),
        }
        match ModelEvent::parse(r#"{"type":"response.output_audio.delta","audio":"REVG"}"#) {
            Some(ModelEvent::AudioDelta { delta }) => assert_eq!(delta, "REVG"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn legacy_completed_tag_maps_to_done() {
        assert!(matches!(
            ModelEvent::parse(r#"{"type":"response.completed"}"#),
            Some(ModelEvent::ResponseDone)
        ));
    }

    #[test]
    fn error_event_carries_message() {
        match ModelEvent::parse(r#"{"type":"error","error":{"message":"bad session"}}"#) {
            Some(ModelEvent::Error { error }) => assert_eq!(error.message, "bad session"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_and_malformed_are_none() {
        assert!(ModelEvent::parse(r#"{"type":"rate_limits.updated"}"#).is_none());
        assert!(ModelEvent::parse("not json").is_none());
    }
}
