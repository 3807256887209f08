//! HTTP webhooks: transcription side-channel, recording callback, the
//! outbound-TwiML endpoint, and the chat-bot command webhook.
//!
//! These handlers run outside the call task; they take the call entry's lock
//! briefly for field updates and dispatch anything stateful to the call task
//! over its control channel. Side effects (chat posts, downloads) are
//! fire-and-forget.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Form, Json};
use serde::Deserialize;

use voice_gateway_core::call::CallControl;
use voice_gateway_core::transcript::Role;
use voice_gateway_outbound::telegram::TelegramUpdate;
use voice_gateway_pipeline::transcript::{classify_track, extract_text, is_recorded_greeting, render_timeline};
use voice_gateway_telephony::twiml::{outbound_connect, OutboundParams};
use voice_gateway_telephony::download_recording;

use crate::state::AppState;

// --- Transcription side-channel ---------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TranscriptForm {
    #[serde(rename = "TranscriptionEvent")]
    pub event: String,
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "Track", default)]
    pub track: Option<String>,
    #[serde(rename = "TranscriptionData", default)]
    pub data: Option<String>,
    #[serde(rename = "TranscriptionText", default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TranscriptHints {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default, rename = "callerName")]
    pub caller_name: Option<String>,
}

pub async fn handle_transcript(
    State(state): State<AppState>,
    Query(hints): Query<TranscriptHints>,
    Form(form): Form<TranscriptForm>,
) -> StatusCode {
    let call = state.calls.ensure(&form.call_sid);

    match form.event.as_str() {
        "transcription-started" => {
            let mut c = call.lock();
            if c.meta.started_at.is_none() {
                c.meta.started_at = Some(state.clock.now());
            }
            if c.meta.from.is_none() {
                c.meta.from = hints.from;
            }
            if c.meta.to.is_none() {
                c.meta.to = hints.to;
            }
            if c.meta.caller_name.is_none() {
                c.meta.caller_name = hints.caller_name;
            }
        }
        "transcription-content" => {
            let Some(role) = form.track.as_deref().and_then(classify_track) else {
                return StatusCode::OK;
            };
            let Some(text) = extract_text(form.data.as_deref(), form.text.as_deref()) else {
                return StatusCode::OK;
            };

            {
                let mut c = call.lock();

                // The recorded greeting comes back on the assistant track;
                // drop the first echo of it.
                if role == Role::Assistant
                    && !c.greeting.skipped_upstream_greeting
                    && !c.events.iter().any(|e| e.role == Role::Assistant)
                    && is_recorded_greeting(&text)
                {
                    c.greeting.skipped_upstream_greeting = true;
                    return StatusCode::OK;
                }

                let elapsed_ms = c
                    .meta
                    .started_at
                    .map(|t| state.clock.now().duration_since(t).as_millis() as u64)
                    .unwrap_or(0);
                c.append_event(role, text.clone(), elapsed_ms);
                c.send_control(CallControl::Transcript { role, text });
            }
        }
        "transcription-stopped" | "transcription-error" => {
            let (rendered, header) = {
                let c = call.lock();
                if c.events.is_empty() {
                    return StatusCode::OK;
                }
                let from = c.meta.from.as_deref().unwrap_or("unknown").to_string();
                let name = c
                    .meta
                    .caller_name
                    .as_deref()
                    .map(|n| format!(" ({n})"))
                    .unwrap_or_default();
                let ended = local_time(state.settings.telegram_tz.as_deref());
                (
                    render_timeline(&c.events),
                    format!("Call {} from {from}{name} — ended {ended}", form.call_sid),
                )
            };
            if let Some(sink) = state.log_sink.clone() {
                tokio::spawn(async move {
                    if let Err(e) = sink.send_text(&format!("{header}\n\n{rendered}")).await {
                        tracing::warn!(error = %e, "transcript sink post failed");
                    }
                });
            }
        }
        other => {
            tracing::debug!(event = other, "unknown transcription event dropped");
        }
    }

    StatusCode::OK
}

/// Wall-clock time for the log sink, shifted by the configured UTC offset
/// (e.g. `-08:00`). Falls back to UTC when unset or unparseable.
fn local_time(tz_offset: Option<&str>) -> String {
    let now = chrono::Utc::now();
    let offset = tz_offset.and_then(parse_utc_offset);
    match offset {
        Some(offset) => now.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S %:z").to_string(),
        None => now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    }
}

fn parse_utc_offset(raw: &str) -> Option<chrono::FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.strip_prefix('-') {
        Some(rest) => (-1i32, rest),
        None => (1i32, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    chrono::FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// --- Recording callback -----------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RecordingForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "RecordingSid", default)]
    pub recording_sid: Option<String>,
    #[serde(rename = "RecordingUrl")]
    pub recording_url: String,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
}

/// The recording becomes available after the call; download with retry and
/// forward to the log sink, decoupled from any call task.
pub async fn handle_recording(
    State(state): State<AppState>,
    Form(form): Form<RecordingForm>,
) -> StatusCode {
    let Some(sink) = state.log_sink.clone() else {
        return StatusCode::OK;
    };
    let telephony = state.telephony.clone();

    tokio::spawn(async move {
        match download_recording(&telephony, &form.recording_url).await {
            Ok(recording) => {
                let filename = format!("call-{}.{}", form.call_sid, recording.extension);
                let caption = format!(
                    "Recording for call {} ({} → {})",
                    form.call_sid,
                    form.from.as_deref().unwrap_or("?"),
                    form.to.as_deref().unwrap_or("?"),
                );
                if let Err(e) = sink.send_document(&filename, recording.bytes, &caption).await {
                    tracing::warn!(call_sid = %form.call_sid, error = %e, "recording sink post failed");
                }
            }
            Err(e) => {
                tracing::warn!(call_sid = %form.call_sid, error = %e, "recording download failed");
            }
        }
    });

    StatusCode::OK
}

// --- Outbound TwiML ---------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OutboundTwimlQuery {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default, rename = "recipientName")]
    pub recipient_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OutboundTwimlForm {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
}

/// TwiML fetched by the provider when the callee answers: start dual-channel
/// recording and both-track transcription, then connect to the media socket.
pub async fn outbound_twiml(
    State(state): State<AppState>,
    Query(query): Query<OutboundTwimlQuery>,
    Form(form): Form<OutboundTwimlForm>,
) -> impl IntoResponse {
    let params = OutboundParams {
        to: query.to.unwrap_or_default(),
        reason: query.reason.unwrap_or_default(),
        theme: query.theme.unwrap_or_default(),
        recipient_name: query.recipient_name.unwrap_or_default(),
        call_sid: form.call_sid.unwrap_or_default(),
    };
    let xml = outbound_connect(
        &state.settings.webhook_url,
        &state.settings.media_socket_url(),
        &params,
    );
    ([("content-type", "text/xml")], xml)
}

// --- Call status ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CallStatusForm {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "CallStatus", default)]
    pub status: Option<String>,
}

pub async fn call_status(Form(form): Form<CallStatusForm>) -> StatusCode {
    tracing::info!(
        call_sid = form.call_sid.as_deref().unwrap_or("?"),
        status = form.status.as_deref().unwrap_or("?"),
        "call status update"
    );
    StatusCode::OK
}

// --- Chat-bot command webhook -----------------------------------------------

pub async fn handle_outbound_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<TelegramUpdate>,
) -> StatusCode {
    let Some(commander) = state.commander.clone() else {
        return StatusCode::OK;
    };
    let Some(message) = update.message else {
        return StatusCode::OK;
    };
    let Some(text) = message.text else {
        return StatusCode::OK;
    };

    let secret = headers
        .get("X-Telegram-Bot-Api-Secret-Token")
        .and_then(|v| v.to_str().ok());
    if !commander.authorize(message.chat.id, secret) {
        // Logged inside authorize; 200 keeps the bot API from retrying.
        return StatusCode::OK;
    }

    let chat_id = message.chat.id;
    let sink = state.outbound_sink.clone();
    tokio::spawn(async move {
        let reply = commander.handle_text(chat_id, &text).await;
        if let Some(sink) = sink {
            if let Err(e) = sink.send_text_to(chat_id, &reply).await {
                tracing::warn!(error = %e, "outbound command reply failed");
            }
        }
    });

    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_offsets_parse() {
        assert_eq!(
            parse_utc_offset("-08:00"),
            chrono::FixedOffset::west_opt(8 * 3600)
        );
        assert_eq!(
            parse_utc_offset("+05:30"),
            chrono::FixedOffset::east_opt(5 * 3600 + 30 * 60)
        );
        assert_eq!(parse_utc_offset("3"), chrono::FixedOffset::east_opt(3 * 3600));
        assert!(parse_utc_offset("PST").is_none());
    }

    #[test]
    fn local_time_falls_back_to_utc() {
        assert!(local_time(None).ends_with("UTC"));
        assert!(local_time(Some("garbage")).ends_with("UTC"));
        assert!(local_time(Some("-08:00")).contains("-08:00"));
    }
}
