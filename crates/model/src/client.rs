//! Realtime socket connection and the client-side event vocabulary.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::events::ModelEvent;
use crate::ModelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const REALTIME_ENDPOINT: &str = "wss://api.openai.com/v1/realtime";

/// Session parameters applied once per call, before any audio flows.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub voice: String,
    pub instructions: String,
    /// Server-side VAD threshold.
    pub vad_threshold: f64,
}

/// Write half of the model socket.
pub struct ModelSender {
    sink: SplitSink<WsStream, Message>,
}

/// Read half of the model socket.
pub struct ModelReceiver {
    stream: SplitStream<WsStream>,
}

/// Open the realtime socket with auth headers and split it for the bridge.
pub async fn connect(
    api_key: &str,
    model: &str,
) -> Result<(ModelSender, ModelReceiver), ModelError> {
    let url = format!("{REALTIME_ENDPOINT}?model={model}");
    let mut request = url
        .into_client_request()
        .map_err(|e| ModelError::Handshake(e.to_string()))?;

    let headers = request.headers_mut();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| ModelError::Handshake(e.to_string()))?,
    );
    headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    let (ws, _resp) = tokio_tungstenite::connect_async(request).await?;
    tracing::debug!(model, "model socket connected");

    let (sink, stream) = ws.split();
    Ok((ModelSender { sink }, ModelReceiver { stream }))
}

impl ModelSender {
    async fn send_json(&mut self, payload: serde_json::Value) -> Result<(), ModelError> {
        self.sink
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(ModelError::from)
    }

    /// Apply the per-call session: voice, VAD, μ-law both directions, and
    /// the full instruction document.
    pub async fn session_update(&mut self, config: &SessionConfig) -> Result<(), ModelError> {
        self.send_json(json!({
            "type": "session.update",
            "session": {
                "voice": config.voice,
                "instructions": config.instructions,
                "modalities": ["audio", "text"],
                "input_audio_format": "g711_ulaw",
                "output_audio_format": "g711_ulaw",
                "turn_detection": {
                    "type": "server_vad",
                    "threshold": config.vad_threshold,
                },
            },
        }))
        .await
    }

    /// Forward one base64 μ-law chunk of caller audio.
    pub async fn append_audio(&mut self, payload_b64: &str) -> Result<(), ModelError> {
        self.send_json(json!({
            "type": "input_audio_buffer.append",
            "audio": payload_b64,
        }))
        .await
    }

    pub async fn clear_input(&mut self) -> Result<(), ModelError> {
        self.send_json(json!({ "type": "input_audio_buffer.clear" })).await
    }

    /// Ask for a response; `instructions` carries greeting/goodbye scripts.
    pub async fn create_response(&mut self, instructions: Option<&str>) -> Result<(), ModelError> {
        let response = match instructions {
            Some(text) => json!({ "modalities": ["audio", "text"], "instructions": text }),
            None => json!({ "modalities": ["audio", "text"] }),
        };
        self.send_json(json!({ "type": "response.create", "response": response }))
            .await
    }

    pub async fn cancel_response(&mut self) -> Result<(), ModelError> {
        self.send_json(json!({ "type": "response.cancel" })).await
    }

    pub async fn clear_output(&mut self) -> Result<(), ModelError> {
        self.send_json(json!({ "type": "output_audio_buffer.clear" })).await
    }

    pub async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
    }
}

impl ModelReceiver {
    /// Next typed event. Skips unknown/malformed messages and pings;
    /// `None` means the socket closed.
    pub async fn next_event(&mut self) -> Option<ModelEvent> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    if let Some(ev) = ModelEvent::parse(&text) {
                        return Some(ev);
                    }
                }
                Ok(Message::Binary(bin)) => {
                    // Fallback delivery: binary PCM16 instead of base64 μ-law.
                    return Some(ModelEvent::BinaryAudio(bin));
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "model socket closed by peer");
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "model socket read error");
                    return None;
                }
            }
        }
    }
}
