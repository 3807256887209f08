//! Chat-bot transport: webhook update types and the Bot API sender.
//!
//! The inbound call-log sink and the outbound command bot are two distinct
//! bots; both share this sender. Replies are chunked at 3800 characters to
//! stay under the Bot API message limit.

use serde::Deserialize;

use crate::OutboundError;

const CHUNK_LIMIT: usize = 3800;
const API_BASE: &str = "https://api.telegram.org";

/// Webhook update envelope; only the message parts the FSM needs.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

/// One bot + one chat: a destination for outgoing messages.
#[derive(Clone)]
pub struct ChatSink {
    http: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl ChatSink {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: API_BASE.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Send text, chunked. Errors are returned but callers on the call path
    /// treat sends as best-effort.
    pub async fn send_text(&self, text: &str) -> Result<(), OutboundError> {
        for chunk in chunk_text(text, CHUNK_LIMIT) {
            self.http
                .post(format!("{}/bot{}/sendMessage", self.api_base, self.token))
                .json(&serde_json::json!({
                    "chat_id": self.chat_id,
                    "text": chunk,
                }))
                .send()
                .await?
                .error_for_status()?;
        }
        Ok(())
    }

    /// Send text to a specific chat (webhook replies go back to the sender).
    pub async fn send_text_to(&self, chat_id: i64, text: &str) -> Result<(), OutboundError> {
        for chunk in chunk_text(text, CHUNK_LIMIT) {
            self.http
                .post(format!("{}/bot{}/sendMessage", self.api_base, self.token))
                .json(&serde_json::json!({
                    "chat_id": chat_id,
                    "text": chunk,
                }))
                .send()
                .await?
                .error_for_status()?;
        }
        Ok(())
    }

    /// Upload a small document (call recording) to the sink chat.
    pub async fn send_document(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), OutboundError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part("document", part);

        self.http
            .post(format!("{}/bot{}/sendDocument", self.api_base, self.token))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Split on char boundaries into chunks of at most `limit` characters.
fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit)
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_parses_message_text() {
        let raw = r#"{
            "update_id": 7,
            "message": {
                "message_id": 1,
                "chat": { "id": 12345, "type": "private" },
                "text": "/call jeff 5680 | invoice follow-up"
            }
        }"#;
        let update: TelegramUpdate = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 12345);
        assert!(message.text.unwrap().starts_with("/call"));
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("hello", 3800).len(), 1);
    }

    #[test]
    fn long_text_chunks_at_limit() {
        let long = "x".repeat(8000);
        let chunks = chunk_text(&long, 3800);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 3800));
        assert_eq!(chunks.concat(), long);
    }
}
