//! Voice Gateway Telephony
//!
//! The telephony provider's surface: call-control REST (create, redirect,
//! hang up), TwiML document builders, and recording download with retry.

pub mod recording;
pub mod rest;
pub mod twiml;

pub use recording::{download_recording, Recording};
pub use rest::{CreatedCall, TelephonyClient};
pub use twiml::{auto_press_envelope, outbound_connect, OutboundParams};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected request ({status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("recording unavailable after retries: {0}")]
    RecordingUnavailable(String),
}
