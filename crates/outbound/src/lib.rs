//! Voice Gateway Outbound
//!
//! The chat-bot command channel: parse `/call` commands from the webhook,
//! hold pending confirmations behind short numeric codes, and place the call
//! through the telephony client on `YES <code>`.

pub mod command;
pub mod commander;
pub mod pending;
pub mod telegram;

pub use command::{parse_command, CallTarget, Command};
pub use commander::OutboundCommander;
pub use pending::{OutboundPending, PendingStore, PopOutcome};
pub use telegram::{ChatSink, TelegramUpdate};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutboundError {
    #[error("chat send failed: {0}")]
    ChatSend(#[from] reqwest::Error),
}
