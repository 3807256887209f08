//! Per-call state and the process-wide call store.
//!
//! The call task (media socket handler) is the sole writer of a call's state;
//! HTTP webhooks and timers either take the entry's lock briefly for field
//! updates or dispatch to the call task through its control channel.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::transcript::{Role, TranscriptEvent};

/// Call lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CallPhase {
    New,
    StreamStarted,
    SessionReady,
    Greeted,
    Active,
    Ending,
    Done,
}

/// Messages dispatched to the call task by I/O handlers.
#[derive(Debug)]
pub enum CallControl {
    /// A transcript line arrived over the side-channel webhook.
    Transcript { role: Role, text: String },
}

/// Outbound-call context carried in from the TwiML custom parameters.
#[derive(Debug, Clone, Default)]
pub struct OutboundMeta {
    pub is_outbound: bool,
    pub reason: Option<String>,
    pub theme: Option<String>,
    pub recipient_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CallMeta {
    pub from: Option<String>,
    pub to: Option<String>,
    pub caller_name: Option<String>,
    pub started_at: Option<Instant>,
    pub outbound: OutboundMeta,
}

#[derive(Debug, Clone, Default)]
pub struct GreetingState {
    pub skipped_upstream_greeting: bool,
    pub sent: bool,
    pub pending: bool,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceState {
    pub selected: String,
    pub assistant_name: String,
}

/// The mute bus: assistant audio is dropped while either bit is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct MuteBus {
    pub barge_in_active: bool,
    pub number_mode_active: bool,
}

impl MuteBus {
    pub fn asserted(&self) -> bool {
        self.barge_in_active || self.number_mode_active
    }
}

/// Do-not-call latch. Monotonic: once attempted it never resets, the idle
/// watchdog yields, and auto-press is inhibited.
#[derive(Debug, Clone, Default)]
pub struct DncState {
    pub attempted: bool,
    pub reason: Option<String>,
}

/// One live call.
#[derive(Debug, Default)]
pub struct CallState {
    pub call_id: String,
    pub stream_id: String,
    pub phase_raw: Option<CallPhase>,
    pub meta: CallMeta,
    pub events: Vec<TranscriptEvent>,
    pub greeting: GreetingState,
    pub voice: VoiceState,
    pub session_ready: bool,
    pub mute: MuteBus,
    pub dnc: DncState,
    /// Control channel to the call task; dropped when the task reaches Done.
    pub control: Option<mpsc::UnboundedSender<CallControl>>,
    last_event_ts_ms: u64,
}

impl CallState {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            phase_raw: Some(CallPhase::New),
            ..Default::default()
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.phase_raw.unwrap_or(CallPhase::New)
    }

    /// Move the lifecycle forward; backwards transitions are ignored.
    pub fn advance(&mut self, to: CallPhase) {
        if to > self.phase() {
            self.phase_raw = Some(to);
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase() == CallPhase::Done
    }

    /// Append a transcript event stamped at `elapsed_ms` since call start,
    /// nudged forward so timestamps stay strictly monotonic at ≥1 ms.
    pub fn append_event(&mut self, role: Role, text: impl Into<String>, elapsed_ms: u64) {
        let ts_ms = elapsed_ms.max(self.last_event_ts_ms + 1);
        self.last_event_ts_ms = ts_ms;
        self.events.push(TranscriptEvent {
            role,
            text: text.into(),
            ts_ms,
        });
    }

    /// Latch the DNC flag. Returns false if it was already set.
    pub fn latch_dnc(&mut self, reason: impl Into<String>) -> bool {
        if self.dnc.attempted {
            return false;
        }
        self.dnc.attempted = true;
        self.dnc.reason = Some(reason.into());
        true
    }

    /// Dispatch a control message to the call task, if it is still running.
    pub fn send_control(&self, msg: CallControl) -> bool {
        match &self.control {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }
}

/// Call-id → state. Survives socket teardown because transcription callbacks
/// may still arrive briefly after the media stream stops.
#[derive(Default)]
pub struct CallStore {
    calls: Mutex<HashMap<String, Arc<Mutex<CallState>>>>,
}

impl CallStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for `call_id`, inserting defaults on first touch.
    pub fn ensure(&self, call_id: &str) -> Arc<Mutex<CallState>> {
        self.calls
            .lock()
            .entry(call_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(CallState::new(call_id))))
            .clone()
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<Mutex<CallState>>> {
        self.calls.lock().get(call_id).cloned()
    }

    pub fn remove(&self, call_id: &str) {
        if self.calls.lock().remove(call_id).is_some() {
            tracing::info!(call_id, "call removed from store");
        }
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.calls.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_only_move_forward() {
        let mut call = CallState::new("CA1");
        call.advance(CallPhase::Active);
        call.advance(CallPhase::StreamStarted);
        assert_eq!(call.phase(), CallPhase::Active);
        call.advance(CallPhase::Done);
        assert!(call.is_done());
    }

    #[test]
    fn event_timestamps_are_strictly_monotonic() {
        let mut call = CallState::new("CA1");
        call.append_event(Role::Caller, "one", 100);
        call.append_event(Role::Caller, "two", 100);
        call.append_event(Role::Assistant, "three", 50);
        let ts: Vec<u64> = call.events.iter().map(|e| e.ts_ms).collect();
        assert_eq!(ts, vec![100, 101, 102]);
    }

    #[test]
    fn dnc_latch_is_monotonic() {
        let mut call = CallState::new("CA1");
        assert!(call.latch_dnc("phrase"));
        assert!(!call.latch_dnc("again"));
        assert_eq!(call.dnc.reason.as_deref(), Some("phrase"));
    }

    #[test]
    fn store_ensures_and_removes() {
        let store = CallStore::new();
        let a = store.ensure("CA1");
        let b = store.ensure("CA1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
        store.remove("CA1");
        assert!(store.get("CA1").is_none());
    }

    #[test]
    fn mute_bus_or() {
        let mut bus = MuteBus::default();
        assert!(!bus.asserted());
        bus.number_mode_active = true;
        assert!(bus.asserted());
        bus.barge_in_active = true;
        bus.number_mode_active = false;
        assert!(bus.asserted());
    }
}
