//! Transcript event types.

use serde::{Deserialize, Serialize};

/// Who said it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Caller,
    Assistant,
}

impl Role {
    pub fn display(&self) -> &'static str {
        match self {
            Role::Caller => "Caller",
            Role::Assistant => "Assistant",
        }
    }
}

/// One utterance, timestamped on ingest. The per-call event log is
/// append-only with monotonic timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub role: Role,
    pub text: String,
    /// Milliseconds since call start, monotonic within a call.
    pub ts_ms: u64,
}
