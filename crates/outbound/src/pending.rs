//! Pending outbound calls awaiting confirmation.
//!
//! Each `/call` produces an entry behind a fresh six-digit code; the entry
//! expires on first use or after the TTL. Expired entries are purged lazily
//! whenever the webhook touches the store.

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct OutboundPending {
    pub destination_e164: String,
    /// Human-readable target for the confirmation reply.
    pub display: String,
    pub theme: String,
    pub recipient_name: Option<String>,
    pub created_at: Instant,
    pub requester_id: i64,
}

/// Result of looking up a confirmation code.
#[derive(Debug)]
pub enum PopOutcome {
    Found(OutboundPending),
    Expired,
    Unknown,
}

pub struct PendingStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, OutboundPending>>,
}

impl PendingStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a pending call under a fresh six-digit code.
    pub fn create(&self, pending: OutboundPending) -> String {
        let mut entries = self.entries.lock();
        self.purge(&mut entries);

        let mut rng = rand::thread_rng();
        let code = loop {
            let candidate = format!("{:06}", rng.gen_range(0..1_000_000u32));
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };
        entries.insert(code.clone(), pending);
        code
    }

    /// Take the entry for `code`, distinguishing expired from unknown.
    pub fn pop(&self, code: &str) -> PopOutcome {
        let mut entries = self.entries.lock();
        match entries.remove(code) {
            Some(entry) if entry.created_at.elapsed() <= self.ttl => PopOutcome::Found(entry),
            Some(_) => PopOutcome::Expired,
            None => PopOutcome::Unknown,
        }
    }

    /// Drop a pending entry. True if it existed.
    pub fn cancel(&self, code: &str) -> bool {
        let mut entries = self.entries.lock();
        self.purge(&mut entries);
        entries.remove(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn purge(&self, entries: &mut HashMap<String, OutboundPending>) {
        entries.retain(|_, e| e.created_at.elapsed() <= self.ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> OutboundPending {
        OutboundPending {
            destination_e164: "+15551235680".into(),
            display: "Jeff (+1 555-123-5680)".into(),
            theme: "invoice follow-up".into(),
            recipient_name: Some("Jeff".into()),
            created_at: Instant::now(),
            requester_id: 42,
        }
    }

    #[test]
    fn create_returns_six_digit_code() {
        let store = PendingStore::new(Duration::from_secs(120));
        let code = store.create(pending());
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn pop_consumes_on_first_use() {
        let store = PendingStore::new(Duration::from_secs(120));
        let code = store.create(pending());

        assert!(matches!(store.pop(&code), PopOutcome::Found(_)));
        assert!(matches!(store.pop(&code), PopOutcome::Unknown));
    }

    #[test]
    fn expired_code_is_distinct_from_unknown() {
        let store = PendingStore::new(Duration::ZERO);
        let mut entry = pending();
        entry.created_at = Instant::now() - Duration::from_secs(1);
        let code = {
            // Bypass create()'s purge by inserting directly.
            let mut entries = store.entries.lock();
            entries.insert("123456".to_string(), entry);
            "123456".to_string()
        };

        assert!(matches!(store.pop(&code), PopOutcome::Expired));
        assert!(matches!(store.pop("999999"), PopOutcome::Unknown));
    }

    #[test]
    fn cancel_removes_entry() {
        let store = PendingStore::new(Duration::from_secs(120));
        let code = store.create(pending());
        assert!(store.cancel(&code));
        assert!(!store.cancel(&code));
    }
}
