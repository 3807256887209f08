//! TwiML document builders.
//!
//! Two documents leave the gateway: the outbound-call connect document
//! (recording + transcription + media stream) and the auto-press DTMF
//! envelope that plays digits and hangs up.

/// Custom parameters attached to the outbound media stream.
#[derive(Debug, Clone, Default)]
pub struct OutboundParams {
    pub to: String,
    pub reason: String,
    pub theme: String,
    pub recipient_name: String,
    pub call_sid: String,
}

/// TwiML for an answered outbound call: start dual-channel recording and
/// both-track transcription (callbacks point back at the gateway), then
/// connect audio to the media socket with the call's parameters.
pub fn outbound_connect(webhook_base: &str, media_socket_url: &str, params: &OutboundParams) -> String {
    let transcript_cb = format!("{webhook_base}/transcript");
    let recording_cb = format!("{webhook_base}/recording");

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Start>
    <Transcription statusCallbackUrl="{transcript_cb}" track="both_tracks"/>
  </Start>
  <Start>
    <Recording recordingStatusCallback="{recording_cb}" recordingChannels="dual"/>
  </Start>
  <Connect>
    <Stream url="{stream_url}">
      <Parameter name="to" value="{to}"/>
      <Parameter name="reason" value="{reason}"/>
      <Parameter name="theme" value="{theme}"/>
      <Parameter name="recipientName" value="{recipient}"/>
      <Parameter name="callSid" value="{call_sid}"/>
    </Stream>
  </Connect>
</Response>"#,
        transcript_cb = escape(&transcript_cb),
        recording_cb = escape(&recording_cb),
        stream_url = escape(media_socket_url),
        to = escape(&params.to),
        reason = escape(&params.reason),
        theme = escape(&params.theme),
        recipient = escape(&params.recipient_name),
        call_sid = escape(&params.call_sid),
    )
}

/// TwiML that presses digits on the caller's IVR, optionally speaks a
/// removal line, and optionally hangs up. `gap_secs` pauses between
/// multiple digits.
pub fn auto_press_envelope(
    digits: &[char],
    gap_secs: u64,
    say_line: Option<&str>,
    hangup: bool,
) -> String {
    let mut body = String::new();
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 {
            body.push_str(&format!("<Pause length=\"{}\"/>", gap_secs.max(1)));
        }
        body.push_str(&format!("<Play digits=\"{digit}\"/>"));
    }
    body.push_str("<Pause length=\"1\"/>");
    if let Some(line) = say_line.filter(|l| !l.is_empty()) {
        body.push_str(&format!("<Say>{}</Say>", escape(line)));
    }
    if hangup {
        body.push_str("<Hangup/>");
    }

    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>{body}</Response>")
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_connect_carries_parameters_and_callbacks() {
        let params = OutboundParams {
            to: "+15551235680".into(),
            reason: "Dan asked".into(),
            theme: "invoice follow-up".into(),
            recipient_name: "Jeff".into(),
            call_sid: "CA1".into(),
        };
        let xml = outbound_connect(
            "https://gw.example.com",
            "wss://gw.example.com/media",
            &params,
        );

        assert!(xml.contains(r#"<Stream url="wss://gw.example.com/media">"#));
        assert!(xml.contains(r#"<Parameter name="theme" value="invoice follow-up"/>"#));
        assert!(xml.contains(r#"statusCallbackUrl="https://gw.example.com/transcript""#));
        assert!(xml.contains(r#"recordingStatusCallback="https://gw.example.com/recording""#));
        assert!(xml.contains(r#"recordingChannels="dual""#));
        assert!(xml.contains(r#"track="both_tracks""#));
    }

    #[test]
    fn auto_press_single_digit_envelope() {
        let xml = auto_press_envelope(&['9'], 1, Some("Please remove this number."), true);
        assert!(xml.contains(r#"<Play digits="9"/><Pause length="1"/><Say>Please remove this number.</Say><Hangup/>"#));
    }

    #[test]
    fn auto_press_default_digits_with_gaps() {
        let xml = auto_press_envelope(&['9', '8'], 1, None, true);
        assert!(xml.contains(r#"<Play digits="9"/><Pause length="1"/><Play digits="8"/>"#));
        assert!(xml.ends_with("<Hangup/></Response>"));
        assert!(!xml.contains("<Say>"));
    }

    #[test]
    fn no_hangup_leaves_call_up() {
        let xml = auto_press_envelope(&['9'], 1, None, false);
        assert!(!xml.contains("<Hangup/>"));
    }

    #[test]
    fn xml_special_characters_escaped() {
        let xml = auto_press_envelope(&['9'], 1, Some("opt out & hang up"), true);
        assert!(xml.contains("opt out &amp; hang up"));
    }
}
