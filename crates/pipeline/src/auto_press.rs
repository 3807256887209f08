//! Auto-press: classify "press N to be removed" spam prompts and fire a
//! rate-limited DTMF redirect.
//!
//! The classifier needs a press-verb plus a digit to produce anything at
//! all; only removal language or a spam caller name pushes confidence above
//! the firing threshold.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use voice_gateway_core::clock::Clock;

/// `press 9`, `dial nine`, etc.
static PRESS_DIGIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:press|dial|hit|enter|push|tap)\s+(\d|zero|oh|one|two|three|four|five|six|seven|eight|nine)\b",
    )
    .expect("press-digit pattern")
});

/// The canonical removal construction: the press instruction is followed by
/// a removal purpose ("press 9 to be removed", "press two to opt out").
static STRONG_REMOVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:press|dial|hit|enter|push|tap)\s+\S+\s+(?:to|and)\b.{0,40}?(?:remov|opt[\s-]?out|unsubscrib|do[\s-]?not[\s-]?call)",
    )
    .expect("strong-removal pattern")
});

/// Any removal keyword, anywhere in the utterance.
static REMOVAL_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)remov|opt[\s-]?out|unsubscrib|do[\s-]?not[\s-]?call|stop\s+calling")
        .expect("removal-keyword pattern")
});

static SPAM_CNAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)spam|scam").expect("spam-cnam pattern"));

/// True when the telephony caller-name field smells like spam labeling.
pub fn cnam_is_spam(caller_name: &str) -> bool {
    SPAM_CNAM.is_match(caller_name)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoPressIntent {
    pub digit: char,
    pub confidence: f64,
}

fn word_to_digit(word: &str) -> Option<char> {
    let lower = word.to_ascii_lowercase();
    if lower.len() == 1 && lower.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return lower.chars().next();
    }
    match lower.as_str() {
        "zero" | "oh" => Some('0'),
        "one" => Some('1'),
        "two" => Some('2'),
        "three" => Some('3'),
        "four" => Some('4'),
        "five" => Some('5'),
        "six" => Some('6'),
        "seven" => Some('7'),
        "eight" => Some('8'),
        "nine" => Some('9'),
        _ => None,
    }
}

/// Classify one caller utterance. `None` when no press-digit was found.
pub fn classify_auto_press(utterance: &str, caller_name: Option<&str>) -> Option<AutoPressIntent> {
    let captures = PRESS_DIGIT.captures(utterance)?;
    let digit = word_to_digit(captures.get(1)?.as_str())?;

    let confidence = if STRONG_REMOVAL.is_match(utterance) {
        0.97
    } else if REMOVAL_KEYWORD.is_match(utterance) {
        0.94
    } else if caller_name.map(cnam_is_spam).unwrap_or(false) {
        0.90
    } else if utterance.split_whitespace().count() > 3 {
        // A press instruction buried in other context, but nothing that
        // names removal.
        0.35
    } else {
        0.25
    };

    Some(AutoPressIntent { digit, confidence })
}

/// `(caller_last10, digit) → last_fired_at`. The CNAM default-digits variant
/// uses the literal key `default`, sharing the namespace with real digits.
pub struct AutoPressRateLimiter {
    clock: Arc<dyn Clock>,
    window: Duration,
    fired: Mutex<HashMap<(String, String), Instant>>,
}

impl AutoPressRateLimiter {
    pub fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            clock,
            window,
            fired: Mutex::new(HashMap::new()),
        }
    }

    /// Check the window and record the attempt in one step. The attempt is
    /// recorded even when the caller's subsequent REST call fails, so a
    /// retried spam call inside the window never re-fires.
    pub fn check_and_record(&self, caller_last10: &str, digit_key: &str) -> bool {
        let now = self.clock.now();
        let key = (caller_last10.to_string(), digit_key.to_string());
        let mut fired = self.fired.lock();
        if let Some(&at) = fired.get(&key) {
            if now.duration_since(at) < self.window {
                return false;
            }
        }
        fired.insert(key, now);
        true
    }
}
