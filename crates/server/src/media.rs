//! The per-call bridge.
//!
//! One task per call owns the telephony socket and the model socket, fans
//! events between them, and drives the control loops. Ordering rules that
//! matter here:
//!
//! - the session update reaches the model before any greeting or audio;
//! - outbound greetings go out as soon as the model socket is up (callees
//!   speak first otherwise), inbound greetings wait for `session.updated`
//!   with a fallback at +6 s;
//! - on barge-in the telephony `clear` is sent strictly before the model's
//!   `response.cancel`, or the caller keeps hearing buffered audio.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use voice_gateway_config::instructions::{build_instructions, CallContext, OutboundContext};
use voice_gateway_config::voice::select_voice;
use voice_gateway_core::call::{CallControl, CallPhase, CallState, OutboundMeta};
use voice_gateway_core::events::{clear_message, media_message, StartInfo, TelephonyEvent};
use voice_gateway_core::phone::normalize_last10;
use voice_gateway_core::audio::pcm16_16k_to_mulaw_8k;
use voice_gateway_core::transcript::Role;
use voice_gateway_core::FrameSlicer;
use voice_gateway_model::{ModelError, ModelEvent, ModelReceiver, ModelSender, SessionConfig};
use voice_gateway_pipeline::auto_press::{classify_auto_press, cnam_is_spam};
use voice_gateway_pipeline::barge_in::{BargeInController, BargeInDecision};
use voice_gateway_pipeline::idle::IdleWatchdog;
use voice_gateway_pipeline::number_mode::NumberModeController;
use voice_gateway_telephony::twiml::auto_press_envelope;

use crate::state::AppState;

const VAD_THRESHOLD: f64 = 0.55;
const GREETING_FALLBACK: Duration = Duration::from_secs(6);
const GOODBYE_GRACE: Duration = Duration::from_millis(1500);
/// Late transcription callbacks may arrive after socket teardown; the call
/// entry lingers this long before removal.
const STORE_LINGER: Duration = Duration::from_secs(60);

type TelephonySink = SplitSink<WebSocket, Message>;
type TelephonyStream = SplitStream<WebSocket>;
type ModelConnect = JoinHandle<Result<(ModelSender, ModelReceiver), ModelError>>;

pub async fn handle_media_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_call(socket, state))
}

async fn run_call(socket: WebSocket, state: AppState) {
    let (mut tw_tx, mut tw_rx) = socket.split();

    let (start, model_connect) = match await_start(&mut tw_rx, &state).await {
        Some(pair) => pair,
        None => return,
    };

    let call_sid = start.call_sid.clone();
    let stream_sid = start.stream_sid.clone();
    tracing::info!(call_sid = %call_sid, stream_sid = %stream_sid, "media stream started");

    let bridge = match setup_call(&state, &start, model_connect).await {
        Ok(bridge) => bridge,
        Err(e) => {
            tracing::error!(call_sid = %call_sid, error = %e, "call setup failed");
            // Orderly close: drop the model side (if any) and hang up the leg.
            let telephony = state.telephony.clone();
            let sid = call_sid.clone();
            tokio::spawn(async move {
                let _ = telephony.complete_call(&sid).await;
            });
            return;
        }
    };

    steady_state(bridge, &mut tw_tx, &mut tw_rx, &state).await;
}

/// Read the socket until `start` arrives. The model socket starts connecting
/// on `connected`, in parallel, and the operator config refreshes in the
/// background so the call task never waits on it.
async fn await_start(
    tw_rx: &mut TelephonyStream,
    state: &AppState,
) -> Option<(StartInfo, Option<ModelConnect>)> {
    let mut model_connect: Option<ModelConnect> = None;

    loop {
        match tw_rx.next().await {
            Some(Ok(Message::Text(text))) => match TelephonyEvent::parse(&text) {
                Some(TelephonyEvent::Connected) => {
                    model_connect.get_or_insert_with(|| spawn_model_connect(state));
                    let provider = state.config.clone();
                    tokio::spawn(async move { provider.refresh().await });
                }
                Some(TelephonyEvent::Start { start }) => return Some((start, model_connect)),
                Some(TelephonyEvent::Stop) => return None,
                Some(_) | None => {}
            },
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "telephony socket error before start");
                return None;
            }
            Some(Ok(_)) => {}
        }
    }
}

fn spawn_model_connect(state: &AppState) -> ModelConnect {
    let settings = state.settings.clone();
    tokio::spawn(async move {
        voice_gateway_model::connect(&settings.openai_api_key, &settings.realtime_model).await
    })
}

/// Everything the steady-state loop needs, assembled at `start`.
struct Bridge {
    call: Arc<parking_lot::Mutex<CallState>>,
    call_sid: String,
    stream_sid: String,
    model_tx: ModelSender,
    model_rx: ModelReceiver,
    ctrl_rx: mpsc::UnboundedReceiver<CallControl>,
    barge_in: BargeInController,
    number_mode: NumberModeController,
    idle: IdleWatchdog,
    slicer: FrameSlicer,
    greeting_text: String,
    greeting_fallback: Option<Instant>,
    caller_last10: String,
    caller_name: Option<String>,
}

async fn setup_call(
    state: &AppState,
    start: &StartInfo,
    model_connect: Option<ModelConnect>,
) -> Result<Bridge, ModelError> {
    let settings = &state.settings;
    let params = &start.custom_parameters;
    let is_outbound = params.theme.is_some() || params.reason.is_some();

    // Cached snapshot only; the refresh kicked off at `connected`.
    let operator = state.config.snapshot();

    // Inbound calls match the caller, outbound calls match the callee.
    let counterparty = if is_outbound {
        params.to.clone()
    } else {
        params.from.clone()
    };
    let caller_last10 = counterparty.as_deref().map(normalize_last10).unwrap_or_default();
    let vip = counterparty.as_deref().and_then(|n| operator.match_vip(n));
    let choice = select_voice(settings, vip);

    let instructions = build_instructions(
        &operator,
        &CallContext {
            call_id: &start.call_sid,
            caller_number: counterparty.as_deref(),
            vip,
            outbound: is_outbound.then(|| OutboundContext {
                reason: params.reason.clone(),
                theme: params.theme.clone(),
                recipient_name: params.recipient_name.clone(),
            }),
            assistant_name: &choice.assistant_name,
        },
    );

    let greeting_text = greeting_text(
        is_outbound,
        params.recipient_name.as_deref(),
        params.theme.as_deref(),
        vip.map(|v| v.name.as_str()),
        &choice.assistant_name,
    );

    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
    let call = state.calls.ensure(&start.call_sid);
    {
        let mut c = call.lock();
        c.stream_id = start.stream_sid.clone();
        c.meta.from = params.from.clone();
        c.meta.to = params.to.clone();
        c.meta.caller_name = params.caller_name.clone();
        if c.meta.started_at.is_none() {
            c.meta.started_at = Some(state.clock.now());
        }
        c.meta.outbound = OutboundMeta {
            is_outbound,
            reason: params.reason.clone(),
            theme: params.theme.clone(),
            recipient_name: params.recipient_name.clone(),
        };
        c.voice.selected = choice.voice.clone();
        c.voice.assistant_name = choice.assistant_name.clone();
        c.greeting.pending = true;
        c.control = Some(ctrl_tx);
        c.advance(CallPhase::StreamStarted);
    }

    // The model socket opened in parallel; join it now.
    let connect = model_connect.unwrap_or_else(|| spawn_model_connect(state));
    let (mut model_tx, model_rx) = connect
        .await
        .map_err(|e| ModelError::Handshake(e.to_string()))??;

    // Session config strictly before any greeting or audio.
    model_tx
        .session_update(&SessionConfig {
            voice: choice.voice.clone(),
            instructions,
            vad_threshold: VAD_THRESHOLD,
        })
        .await?;
    model_tx.clear_input().await?;

    let mut idle = IdleWatchdog::new(state.clock.clone(), settings.idle_hangup);
    let mut greeting_fallback = Some(state.clock.now() + GREETING_FALLBACK);

    // Outbound: greet now, without waiting for session.updated. Callees
    // typically say "hello?" into silence otherwise.
    if is_outbound {
        send_greeting_once(&call, &mut model_tx, &greeting_text).await;
        greeting_fallback = None;
    }

    // CNAM spam: fire the default-digits variant right at stream start.
    if !is_outbound
        && settings.auto_dnc_enable
        && settings.auto_dnc_on_cnam
        && !settings.auto_dnc_only_on_phrase
    {
        let spam_name = params
            .caller_name
            .as_deref()
            .is_some_and(cnam_is_spam);
        if spam_name && state.rate_limiter.check_and_record(&caller_last10, "default") {
            let latched = call.lock().latch_dnc("cnam spam label");
            if latched {
                idle.disarm();
                spawn_auto_press_redirect(state, &start.call_sid, &settings.auto_dnc_digits);
            }
        }
    }

    Ok(Bridge {
        call,
        call_sid: start.call_sid.clone(),
        stream_sid: start.stream_sid.clone(),
        model_tx,
        model_rx,
        ctrl_rx,
        barge_in: BargeInController::new(state.clock.clone()),
        number_mode: NumberModeController::new(
            state.clock.clone(),
            settings.number_silence_grace,
            settings.number_min_digits,
        ),
        idle,
        slicer: FrameSlicer::new(),
        greeting_text,
        greeting_fallback,
        caller_last10,
        caller_name: params.caller_name.clone(),
    })
}

async fn steady_state(
    mut bridge: Bridge,
    tw_tx: &mut TelephonySink,
    tw_rx: &mut TelephonyStream,
    state: &AppState,
) {
    let settings = state.settings.clone();

    'call: loop {
        // One wakeup for whichever timer is next: greeting fallback, idle,
        // barge-in release, number-mode silence.
        let next_deadline = [
            bridge.greeting_fallback,
            bridge.idle.deadline(),
            bridge.barge_in.release_deadline(),
            bridge.number_mode.silence_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or_else(|| state.clock.now() + Duration::from_secs(3600));

        tokio::select! {
            msg = tw_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match TelephonyEvent::parse(&text) {
                    Some(TelephonyEvent::Media { media }) => {
                        bridge.idle.bump();
                        // μ-law passthrough: the payload is forwarded verbatim.
                        if bridge.model_tx.append_audio(&media.payload).await.is_err() {
                            tracing::warn!(call_sid = %bridge.call_sid, "model socket write failed");
                            break;
                        }
                    }
                    Some(TelephonyEvent::Stop) => {
                        tracing::info!(call_sid = %bridge.call_sid, "media stream stopped");
                        break;
                    }
                    Some(TelephonyEvent::Dtmf { dtmf }) => {
                        bridge.idle.bump();
                        tracing::debug!(call_sid = %bridge.call_sid, digit = %dtmf.digit, "caller dtmf");
                    }
                    Some(TelephonyEvent::Mark { .. }) | Some(TelephonyEvent::Connected)
                    | Some(TelephonyEvent::Start { .. }) => bridge.idle.bump(),
                    Some(TelephonyEvent::Unknown) | None => {}
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::warn!(call_sid = %bridge.call_sid, error = %e, "telephony socket error");
                    break;
                }
                Some(Ok(_)) => {}
            },

            ev = bridge.model_rx.next_event() => match ev {
                Some(ModelEvent::SessionUpdated) => {
                    {
                        let mut c = bridge.call.lock();
                        c.session_ready = true;
                        c.advance(CallPhase::SessionReady);
                    }
                    if send_greeting_once(&bridge.call, &mut bridge.model_tx, &bridge.greeting_text).await {
                        bridge.greeting_fallback = None;
                    }
                }
                Some(ModelEvent::SpeechStarted) => {
                    bridge.idle.bump();
                    if bridge.barge_in.speech_started() == BargeInDecision::Assert {
                        { bridge.call.lock().mute.barge_in_active = true; }
                        bridge.slicer.clear();
                        // Telephony clear strictly before model cancel.
                        let _ = tw_tx.send(Message::Text(clear_message(&bridge.stream_sid))).await;
                        let _ = bridge.model_tx.cancel_response().await;
                        let _ = bridge.model_tx.clear_output().await;
                    }
                }
                Some(ModelEvent::SpeechStopped) => {
                    bridge.idle.bump();
                    bridge.barge_in.speech_stopped();
                }
                Some(ModelEvent::AudioDelta { delta }) => {
                    bridge.idle.bump();
                    if bridge.call.lock().mute.asserted() {
                        // The bus wins over in-flight audio.
                        continue;
                    }
                    match BASE64.decode(delta.as_bytes()) {
                        Ok(bytes) => {
                            if !forward_downstream(&mut bridge, tw_tx, &bytes).await {
                                tracing::warn!(call_sid = %bridge.call_sid, "telephony socket write failed");
                                break 'call;
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "undecodable audio delta dropped"),
                    }
                }
                Some(ModelEvent::BinaryAudio(bytes)) => {
                    bridge.idle.bump();
                    if bridge.call.lock().mute.asserted() {
                        continue;
                    }
                    // PCM16 @ 16 kHz fallback: decimate and μ-law encode.
                    let mulaw = pcm16_16k_to_mulaw_8k(&bytes);
                    if !forward_downstream(&mut bridge, tw_tx, &mulaw).await {
                        tracing::warn!(call_sid = %bridge.call_sid, "telephony socket write failed");
                        break 'call;
                    }
                }
                Some(ModelEvent::TranscriptDelta { .. }) => {
                    // Assistant text also arrives on the transcription
                    // side-channel, which is what we log; drop this copy.
                }
                Some(ModelEvent::ResponseDone) => {
                    // Flush the sub-frame residue of this response.
                    if !bridge.call.lock().mute.asserted() {
                        if let Some(residue) = bridge.slicer.flush() {
                            let msg = media_message(&bridge.stream_sid, &BASE64.encode(&residue));
                            let _ = tw_tx.send(Message::Text(msg)).await;
                        }
                    } else {
                        bridge.slicer.clear();
                    }
                }
                Some(ModelEvent::OutputCleared) => {}
                Some(ModelEvent::Error { error }) => {
                    tracing::warn!(call_sid = %bridge.call_sid, kind = %error.kind, message = %error.message, "model error event");
                }
                None => {
                    tracing::info!(call_sid = %bridge.call_sid, "model socket closed");
                    break;
                }
            },

            ctrl = bridge.ctrl_rx.recv() => if let Some(CallControl::Transcript { role, text }) = ctrl {
                bridge.idle.bump();
                if role == Role::Caller {
                    handle_caller_line(&mut bridge, state, &settings, &text).await;
                }
            },

            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(next_deadline)) => {
                if bridge.greeting_fallback.is_some_and(|at| state.clock.now() >= at) {
                    bridge.greeting_fallback = None;
                    send_greeting_once(&bridge.call, &mut bridge.model_tx, &bridge.greeting_text).await;
                }
                if bridge.barge_in.try_release() {
                    bridge.call.lock().mute.barge_in_active = false;
                }
                if bridge.number_mode.try_silence_exit() {
                    bridge.call.lock().mute.number_mode_active = false;
                }
                if bridge.idle.fired() {
                    if bridge.call.lock().dnc.attempted {
                        // DNC owns the hangup; stand down.
                        bridge.idle.disarm();
                    } else {
                        tracing::info!(call_sid = %bridge.call_sid, "idle timeout, hanging up");
                        if settings.idle_send_goodbye {
                            let _ = bridge
                                .model_tx
                                .create_response(Some(&format!(
                                    "Say exactly: \"{}\" and nothing else.",
                                    settings.idle_goodbye_line
                                )))
                                .await;
                            tokio::time::sleep(GOODBYE_GRACE).await;
                        }
                        let telephony = state.telephony.clone();
                        let sid = bridge.call_sid.clone();
                        tokio::spawn(async move {
                            if let Err(e) = telephony.complete_call(&sid).await {
                                tracing::warn!(call_sid = %sid, error = %e, "idle hangup REST failed");
                            }
                        });
                        break;
                    }
                }
            },
        }
    }

    teardown(bridge, tw_tx, state).await
}

/// Re-frame assistant audio into 20 ms media events and push them out.
/// False means the telephony socket is gone.
async fn forward_downstream(bridge: &mut Bridge, tw_tx: &mut TelephonySink, mulaw: &[u8]) -> bool {
    {
        bridge.call.lock().advance(CallPhase::Active);
    }
    for frame in bridge.slicer.push(mulaw) {
        let msg = media_message(&bridge.stream_sid, &BASE64.encode(&frame));
        if tw_tx.send(Message::Text(msg)).await.is_err() {
            return false;
        }
    }
    true
}

/// Number-mode and auto-press over one caller transcript line.
async fn handle_caller_line(
    bridge: &mut Bridge,
    state: &AppState,
    settings: &voice_gateway_config::Settings,
    text: &str,
) {
    let update = bridge.number_mode.ingest_line(text);
    if update.entered {
        bridge.call.lock().mute.number_mode_active = true;
    }
    if update.satisfied {
        bridge.call.lock().mute.number_mode_active = false;
    }

    if !settings.auto_dnc_enable {
        return;
    }
    if bridge.call.lock().dnc.attempted {
        return;
    }
    let Some(intent) = classify_auto_press(text, bridge.caller_name.as_deref()) else {
        return;
    };
    if intent.confidence < settings.auto_press_confidence {
        tracing::debug!(
            call_sid = %bridge.call_sid,
            digit = %intent.digit,
            confidence = intent.confidence,
            "auto-press below threshold"
        );
        return;
    }
    if !state
        .rate_limiter
        .check_and_record(&bridge.caller_last10, &intent.digit.to_string())
    {
        tracing::info!(call_sid = %bridge.call_sid, digit = %intent.digit, "auto-press rate-limited");
        return;
    }
    if bridge
        .call
        .lock()
        .latch_dnc(format!("press {} phrase", intent.digit))
    {
        tracing::info!(
            call_sid = %bridge.call_sid,
            digit = %intent.digit,
            confidence = intent.confidence,
            "auto-press firing"
        );
        bridge.idle.disarm();
        spawn_auto_press_redirect(state, &bridge.call_sid, &[intent.digit]);
    }
}

/// Redirect the live call to the DTMF envelope, fire-and-forget.
fn spawn_auto_press_redirect(state: &AppState, call_sid: &str, digits: &[char]) {
    let settings = state.settings.clone();
    let telephony = state.telephony.clone();
    let sid = call_sid.to_string();
    let digits = digits.to_vec();
    tokio::spawn(async move {
        let say_line = (!settings.dnc_say_line.is_empty()).then_some(settings.dnc_say_line.as_str());
        let gap_secs = settings.auto_dnc_gap.as_secs().max(1);
        let twiml = auto_press_envelope(&digits, gap_secs, say_line, settings.dnc_hangup_after);
        if let Err(e) = telephony.redirect_twiml(&sid, &twiml).await {
            // The rate limiter already recorded this attempt; a retried call
            // inside the window stays suppressed even though this failed.
            tracing::warn!(call_sid = %sid, error = %e, "auto-press redirect failed");
        }
    });
}

/// Emit the greeting at most once per call; the latch lives in call state so
/// every schedule path shares it.
async fn send_greeting_once(
    call: &Arc<parking_lot::Mutex<CallState>>,
    model_tx: &mut ModelSender,
    text: &str,
) -> bool {
    {
        let mut c = call.lock();
        if c.greeting.sent {
            return false;
        }
        c.greeting.sent = true;
        c.greeting.pending = false;
        c.advance(CallPhase::Greeted);
    }
    let instructions = format!("Greet the caller now. Say exactly: \"{text}\"");
    if let Err(e) = model_tx.create_response(Some(&instructions)).await {
        tracing::warn!(error = %e, "greeting send failed");
    }
    true
}

fn greeting_text(
    is_outbound: bool,
    recipient_name: Option<&str>,
    theme: Option<&str>,
    vip_name: Option<&str>,
    assistant_name: &str,
) -> String {
    if is_outbound {
        let name_part = recipient_name
            .filter(|n| !n.is_empty())
            .map(|n| format!(" {n}"))
            .unwrap_or_default();
        let theme = theme.unwrap_or("something Dan wanted to discuss");
        return format!(
            "Hi{name_part} — this is {assistant_name}, Dan's VIP AI assistant. \
             Dan asked me to call about: {theme}. Is now a good time?"
        );
    }
    match vip_name {
        Some(name) => {
            let first = name.split_whitespace().next().unwrap_or(name);
            format!(
                "Hi {first} — This is {assistant_name}, Dan's VIP Assistant. \
                 Dan hasn't picked up yet. How can I help?"
            )
        }
        None => format!("Hi — it's {assistant_name}. How can I help?"),
    }
}

/// Orderly shutdown: cancel every timer, drop the control channel, close
/// both sockets, and let the store entry linger for late transcription.
async fn teardown(mut bridge: Bridge, tw_tx: &mut TelephonySink, state: &AppState) {
    {
        let mut c = bridge.call.lock();
        c.advance(CallPhase::Ending);
        c.control = None;
        c.mute = Default::default();
        c.advance(CallPhase::Done);
    }
    bridge.idle.disarm();
    bridge.barge_in.reset();
    bridge.number_mode.reset();
    bridge.greeting_fallback = None;

    bridge.model_tx.close().await;
    let _ = tw_tx.close().await;

    let calls = state.calls.clone();
    let sid = bridge.call_sid.clone();
    tokio::spawn(async move {
        tokio::time::sleep(STORE_LINGER).await;
        calls.remove(&sid);
    });

    tracing::info!(call_sid = %bridge.call_sid, "call torn down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_vip_greeting_text() {
        let text = greeting_text(false, None, None, Some("Jeff"), "Trinity");
        assert_eq!(
            text,
            "Hi Jeff — This is Trinity, Dan's VIP Assistant. Dan hasn't picked up yet. How can I help?"
        );
    }

    #[test]
    fn inbound_stranger_greeting_text() {
        let text = greeting_text(false, None, None, None, "Trinity");
        assert_eq!(text, "Hi — it's Trinity. How can I help?");
    }

    #[test]
    fn outbound_greeting_carries_theme() {
        let text = greeting_text(
            true,
            Some("Jeff"),
            Some("invoice follow-up"),
            None,
            "Trinity",
        );
        assert_eq!(
            text,
            "Hi Jeff — this is Trinity, Dan's VIP AI assistant. Dan asked me to call about: invoice follow-up. Is now a good time?"
        );
    }

    #[test]
    fn vip_first_name_only() {
        let text = greeting_text(false, None, None, Some("Jeff van Houten"), "Ballad");
        assert!(text.starts_with("Hi Jeff — This is Ballad"));
    }
}
