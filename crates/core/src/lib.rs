//! Voice Gateway Core
//!
//! Shared vocabulary for the gateway: per-call state, tagged wire events for
//! the telephony media socket, the G.711 μ-law codec with 20 ms framing, and
//! the clock abstraction used by the control loops.

pub mod audio;
pub mod call;
pub mod clock;
pub mod events;
pub mod phone;
pub mod transcript;

pub use audio::{FrameSlicer, MULAW_FRAME_BYTES};
pub use call::{CallControl, CallPhase, CallState, CallStore, OutboundMeta};
pub use clock::{Clock, MockClock, SystemClock};
pub use events::{CustomParameters, StartInfo, TelephonyEvent};
pub use transcript::{Role, TranscriptEvent};
