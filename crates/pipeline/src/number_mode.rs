//! Number-mode: the assistant goes quiet while the caller recites digits.
//!
//! Entered when a caller transcript line carries enough digits (spoken or
//! numeric) or phone punctuation. Each new digit extends a silence timer;
//! the mode exits on silence, on reaching the minimum digit count, or when
//! the call ends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use voice_gateway_core::clock::Clock;

/// Spoken digit words, matched case-insensitively.
const DIGIT_WORDS: &[(&str, char)] = &[
    ("zero", '0'),
    ("oh", '0'),
    ("o", '0'),
    ("one", '1'),
    ("two", '2'),
    ("three", '3'),
    ("four", '4'),
    ("five", '5'),
    ("six", '6'),
    ("seven", '7'),
    ("eight", '8'),
    ("nine", '9'),
];

const ENTER_DIGIT_THRESHOLD: usize = 3;

/// Digits found in a line, numerically and by spoken-word table.
pub fn extract_digits(line: &str) -> Vec<char> {
    let mut digits = Vec::new();
    for token in line.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            digits.extend(token.chars());
            continue;
        }
        let lower = token.to_ascii_lowercase();
        if let Some(&(_, d)) = DIGIT_WORDS.iter().find(|(w, _)| *w == lower) {
            digits.push(d);
        }
    }
    digits
}

fn has_phone_punctuation(line: &str) -> bool {
    line.contains('-') || line.contains('(') || line.contains(')')
}

/// What a transcript line did to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberModeUpdate {
    pub entered: bool,
    pub digits_added: usize,
    /// Mode exited because the digit minimum was reached.
    pub satisfied: bool,
}

pub struct NumberModeController {
    clock: Arc<dyn Clock>,
    silence_grace: Duration,
    min_digits: usize,
    active: bool,
    digits_collected: usize,
    last_digit_at: Option<Instant>,
}

impl NumberModeController {
    pub fn new(clock: Arc<dyn Clock>, silence_grace: Duration, min_digits: usize) -> Self {
        Self {
            clock,
            silence_grace,
            min_digits,
            active: false,
            digits_collected: 0,
            last_digit_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn digits_collected(&self) -> usize {
        self.digits_collected
    }

    /// Feed one caller transcript line.
    pub fn ingest_line(&mut self, line: &str) -> NumberModeUpdate {
        let digits = extract_digits(line);
        let mut update = NumberModeUpdate {
            entered: false,
            digits_added: digits.len(),
            satisfied: false,
        };

        if !self.active {
            if digits.len() >= ENTER_DIGIT_THRESHOLD
                || (has_phone_punctuation(line) && !digits.is_empty())
            {
                self.active = true;
                self.digits_collected = 0;
                update.entered = true;
            } else {
                return update;
            }
        }

        if !digits.is_empty() {
            self.digits_collected += digits.len();
            self.last_digit_at = Some(self.clock.now());
        }

        if self.digits_collected >= self.min_digits {
            self.exit();
            update.satisfied = true;
        }
        update
    }

    /// When the silence timer will fire, if the mode is holding the bus.
    pub fn silence_deadline(&self) -> Option<Instant> {
        if !self.active {
            return None;
        }
        self.last_digit_at.map(|at| at + self.silence_grace)
    }

    /// Fire the silence timer if due. Returns true when the mode exited.
    pub fn try_silence_exit(&mut self) -> bool {
        match self.silence_deadline() {
            Some(at) if self.clock.now() >= at => {
                self.exit();
                true
            }
            _ => false,
        }
    }

    /// Call teardown.
    pub fn reset(&mut self) {
        self.exit();
    }

    fn exit(&mut self) {
        self.active = false;
        self.digits_collected = 0;
        self.last_digit_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_gateway_core::clock::MockClock;

    fn controller() -> (NumberModeController, MockClock) {
        let clock = MockClock::new();
        (
            NumberModeController::new(Arc::new(clock.clone()), Duration::from_millis(2500), 10),
            clock,
        )
    }

    #[test]
    fn extracts_spoken_and_numeric_digits() {
        assert_eq!(
            extract_digits("my number is five five five 123"),
            vec!['5', '5', '5', '1', '2', '3']
        );
        assert_eq!(extract_digits("oh seven"), vec!['0', '7']);
        assert!(extract_digits("no numbers here at all").is_empty());
    }

    #[test]
    fn enters_on_three_spoken_digits() {
        let (mut ctl, _clock) = controller();
        let update = ctl.ingest_line("five five five one two three four five six seven");
        assert!(update.entered);
        // Ten digits immediately satisfies the minimum and releases.
        assert!(update.satisfied);
        assert!(!ctl.is_active());
    }

    #[test]
    fn enters_on_phone_punctuation() {
        let (mut ctl, _clock) = controller();
        let update = ctl.ingest_line("it's (555) 12");
        assert!(update.entered);
        assert!(ctl.is_active());
    }

    #[test]
    fn two_digits_do_not_enter() {
        let (mut ctl, _clock) = controller();
        let update = ctl.ingest_line("press one or two");
        assert!(!update.entered);
        assert!(!ctl.is_active());
    }

    #[test]
    fn silence_exit_after_grace() {
        let (mut ctl, clock) = controller();
        ctl.ingest_line("five five five one two");
        assert!(ctl.is_active());

        clock.advance(Duration::from_millis(2000));
        assert!(!ctl.try_silence_exit());

        // A new digit extends the timer.
        ctl.ingest_line("three");
        clock.advance(Duration::from_millis(2000));
        assert!(!ctl.try_silence_exit());

        clock.advance(Duration::from_millis(600));
        assert!(ctl.try_silence_exit());
        assert!(!ctl.is_active());
    }

    #[test]
    fn min_digits_across_lines_releases() {
        let (mut ctl, _clock) = controller();
        ctl.ingest_line("five five five one two");
        let update = ctl.ingest_line("three four five six seven");
        assert!(update.satisfied);
        assert!(!ctl.is_active());
    }
}
