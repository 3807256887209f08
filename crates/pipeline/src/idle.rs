//! Idle watchdog: hang up calls that have gone silent.
//!
//! Any audio frame, transcript line, or control event bumps the deadline.
//! Once the DNC latch is set the watchdog yields; the auto-press path owns
//! the hangup from there.

use std::sync::Arc;
use std::time::{Duration, Instant};

use voice_gateway_core::clock::Clock;

pub struct IdleWatchdog {
    clock: Arc<dyn Clock>,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl IdleWatchdog {
    pub fn new(clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        let deadline = Some(clock.now() + timeout);
        Self {
            clock,
            timeout,
            deadline,
        }
    }

    /// Any activity on the call resets the single timer.
    pub fn bump(&mut self) {
        if self.deadline.is_some() {
            self.deadline = Some(self.clock.now() + self.timeout);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True when the deadline has passed. The caller decides what a fire
    /// means (goodbye + hangup, or nothing under DNC).
    pub fn fired(&self) -> bool {
        matches!(self.deadline, Some(at) if self.clock.now() >= at)
    }

    /// Stop watching (DNC latched or call tearing down).
    pub fn disarm(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_gateway_core::clock::MockClock;

    fn watchdog(secs: u64) -> (IdleWatchdog, MockClock) {
        let clock = MockClock::new();
        (
            IdleWatchdog::new(Arc::new(clock.clone()), Duration::from_secs(secs)),
            clock,
        )
    }

    #[test]
    fn fires_after_timeout() {
        let (dog, clock) = watchdog(180);
        assert!(!dog.fired());
        clock.advance(Duration::from_secs(181));
        assert!(dog.fired());
    }

    #[test]
    fn bump_defers_firing() {
        let (mut dog, clock) = watchdog(180);
        clock.advance(Duration::from_secs(170));
        dog.bump();
        clock.advance(Duration::from_secs(170));
        assert!(!dog.fired());
        clock.advance(Duration::from_secs(11));
        assert!(dog.fired());
    }

    #[test]
    fn disarm_silences_the_watchdog() {
        let (mut dog, clock) = watchdog(1);
        dog.disarm();
        clock.advance(Duration::from_secs(60));
        assert!(!dog.fired());
        assert!(dog.deadline().is_none());

        // Bumping a disarmed watchdog stays disarmed.
        dog.bump();
        assert!(dog.deadline().is_none());
    }
}
