//! Voice Gateway Pipeline
//!
//! The control-loop fabric that runs alongside audio forwarding: barge-in,
//! number-mode, the idle watchdog, the auto-press classifier, and transcript
//! integration. Each loop is a small state machine driven by the call task;
//! none of them block, and all of them take the shared clock so tests can
//! advance time without sleeping.

pub mod auto_press;
pub mod barge_in;
pub mod idle;
pub mod number_mode;
pub mod transcript;

pub use auto_press::{classify_auto_press, cnam_is_spam, AutoPressIntent, AutoPressRateLimiter};
pub use barge_in::{BargeInController, BargeInDecision};
pub use idle::IdleWatchdog;
pub use number_mode::NumberModeController;
pub use transcript::{classify_track, extract_text, is_recorded_greeting, render_timeline};
