//! Tagged events for the telephony media socket.
//!
//! The provider sends JSON messages tagged by an `event` field. Unknown
//! events deserialize to `Unknown` and are dropped by the caller.

use serde::Deserialize;
use serde_json::json;

/// Inbound media-socket events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    Connected,
    Start { start: StartInfo },
    Media { media: MediaPayload },
    Dtmf { dtmf: DtmfInfo },
    Mark { mark: MarkInfo },
    Stop,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInfo {
    pub stream_sid: String,
    pub call_sid: String,
    #[serde(default)]
    pub custom_parameters: CustomParameters,
}

/// Parameters attached by our TwiML. Inbound calls carry caller id fields;
/// outbound calls additionally carry the reason/theme block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomParameters {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub recipient_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Base64 of 8 kHz μ-law audio.
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DtmfInfo {
    pub digit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkInfo {
    pub name: String,
}

impl TelephonyEvent {
    /// Parse one socket message; `None` means malformed JSON (drop it).
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(ev) => Some(ev),
            Err(e) => {
                tracing::debug!(error = %e, "malformed telephony event dropped");
                None
            }
        }
    }
}

/// Outbound `media` message carrying one base64 μ-law frame.
pub fn media_message(stream_sid: &str, payload_b64: &str) -> String {
    json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": payload_b64 },
    })
    .to_string()
}

/// Outbound `clear` message telling the provider to discard buffered audio.
pub fn clear_message(stream_sid: &str) -> String {
    json!({
        "event": "clear",
        "streamSid": stream_sid,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_custom_parameters() {
        let raw = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "streamSid": "MZxxxx",
                "callSid": "CAxxxx",
                "customParameters": {
                    "from": "+15551235680",
                    "callerName": "JEFF",
                    "theme": "invoice follow-up"
                }
            }
        }"#;
        match TelephonyEvent::parse(raw) {
            Some(TelephonyEvent::Start { start }) => {
                assert_eq!(start.stream_sid, "MZxxxx");
                assert_eq!(start.call_sid, "CAxxxx");
                assert_eq!(start.custom_parameters.from.as_deref(), Some("+15551235680"));
                assert_eq!(start.custom_parameters.theme.as_deref(), Some("invoice follow-up"));
                assert!(start.custom_parameters.reason.is_none());
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_media_and_stop() {
        let media = TelephonyEvent::parse(r#"{"event":"media","media":{"payload":"AAAA"}}"#);
        assert!(matches!(media, Some(TelephonyEvent::Media { .. })));
        let stop = TelephonyEvent::parse(r#"{"event":"stop"}"#);
        assert!(matches!(stop, Some(TelephonyEvent::Stop)));
    }

    #[test]
    fn unknown_event_is_tolerated() {
        let ev = TelephonyEvent::parse(r#"{"event":"somethingNew","data":1}"#);
        assert!(matches!(ev, Some(TelephonyEvent::Unknown)));
        assert!(TelephonyEvent::parse("not json").is_none());
    }

    #[test]
    fn outbound_messages_carry_stream_sid() {
        let media: serde_json::Value =
            serde_json::from_str(&media_message("MZ1", "QUJD")).unwrap();
        assert_eq!(media["event"], "media");
        assert_eq!(media["streamSid"], "MZ1");
        assert_eq!(media["media"]["payload"], "QUJD");

        let clear: serde_json::Value = serde_json::from_str(&clear_message("MZ1")).unwrap();
        assert_eq!(clear["event"], "clear");
    }
}
