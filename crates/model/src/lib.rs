//! Voice Gateway Model
//!
//! Client for the realtime speech-model socket: connection with auth
//! headers, typed server events, and the small set of client events the
//! bridge sends (session update, audio append/clear, response create/cancel,
//! output buffer clear).

pub mod client;
pub mod events;

pub use client::{connect, ModelReceiver, ModelSender, SessionConfig};
pub use events::ModelEvent;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("model endpoint rejected connection: {0}")]
    Handshake(String),
}
