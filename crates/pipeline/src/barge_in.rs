//! Barge-in: caller speech during assistant speech.
//!
//! On speech-start the assistant must go quiet immediately: the telephony
//! socket gets a `clear` (flushing its playback buffer) strictly before the
//! model sees `response.cancel`, otherwise the caller keeps hearing buffered
//! audio during cancellation. Release happens 200 ms after speech-stop,
//! unless a new assertion or number-mode holds the bus.

use std::sync::Arc;
use std::time::{Duration, Instant};

use voice_gateway_core::clock::Clock;

const DEBOUNCE: Duration = Duration::from_millis(250);
const RELEASE_DELAY: Duration = Duration::from_millis(200);

/// Outcome of a speech-started event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BargeInDecision {
    /// Assert the mute bit and run the flush sequence (clear → cancel).
    Assert,
    /// Within the debounce window of the previous assertion; ignore.
    Debounced,
}

pub struct BargeInController {
    clock: Arc<dyn Clock>,
    active: bool,
    last_assert: Option<Instant>,
    pending_release: Option<Instant>,
}

impl BargeInController {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            active: false,
            last_assert: None,
            pending_release: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Caller speech started.
    pub fn speech_started(&mut self) -> BargeInDecision {
        let now = self.clock.now();
        if let Some(last) = self.last_assert {
            if now.duration_since(last) < DEBOUNCE {
                // A new start within the window also invalidates any release
                // scheduled by an intervening stop.
                self.pending_release = None;
                return BargeInDecision::Debounced;
            }
        }
        self.active = true;
        self.last_assert = Some(now);
        self.pending_release = None;
        BargeInDecision::Assert
    }

    /// Caller speech stopped; release is scheduled, not immediate.
    pub fn speech_stopped(&mut self) {
        if self.active {
            self.pending_release = Some(self.clock.now() + RELEASE_DELAY);
        }
    }

    /// Deadline the call task should next wake at, if a release is pending.
    pub fn release_deadline(&self) -> Option<Instant> {
        self.pending_release
    }

    /// Fire the scheduled release if it is due and nothing re-asserted.
    /// Returns true when the barge-in bit actually dropped.
    pub fn try_release(&mut self) -> bool {
        match self.pending_release {
            Some(at) if self.clock.now() >= at => {
                self.pending_release = None;
                self.active = false;
                true
            }
            _ => false,
        }
    }

    /// Drop everything (call teardown).
    pub fn reset(&mut self) {
        self.active = false;
        self.pending_release = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_gateway_core::clock::MockClock;

    fn controller() -> (BargeInController, MockClock) {
        let clock = MockClock::new();
        (BargeInController::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn first_start_asserts() {
        let (mut ctl, _clock) = controller();
        assert_eq!(ctl.speech_started(), BargeInDecision::Assert);
        assert!(ctl.is_active());
    }

    #[test]
    fn rapid_restart_is_debounced() {
        let (mut ctl, clock) = controller();
        assert_eq!(ctl.speech_started(), BargeInDecision::Assert);
        clock.advance(Duration::from_millis(100));
        assert_eq!(ctl.speech_started(), BargeInDecision::Debounced);
        clock.advance(Duration::from_millis(200));
        assert_eq!(ctl.speech_started(), BargeInDecision::Assert);
    }

    #[test]
    fn release_fires_after_delay() {
        let (mut ctl, clock) = controller();
        ctl.speech_started();
        ctl.speech_stopped();

        // Not yet due.
        clock.advance(Duration::from_millis(100));
        assert!(!ctl.try_release());
        assert!(ctl.is_active());

        clock.advance(Duration::from_millis(150));
        assert!(ctl.try_release());
        assert!(!ctl.is_active());
    }

    #[test]
    fn new_start_cancels_pending_release() {
        let (mut ctl, clock) = controller();
        ctl.speech_started();
        ctl.speech_stopped();

        // Caller speaks again before the release lands (debounced, but it
        // still voids the release).
        clock.advance(Duration::from_millis(100));
        ctl.speech_started();
        clock.advance(Duration::from_millis(500));
        assert!(!ctl.try_release());
        assert!(ctl.is_active());
    }

    #[test]
    fn stop_without_start_is_inert() {
        let (mut ctl, clock) = controller();
        ctl.speech_stopped();
        clock.advance(Duration::from_secs(1));
        assert!(!ctl.try_release());
        assert!(ctl.release_deadline().is_none());
    }
}
