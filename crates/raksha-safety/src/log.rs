//! Local append-only escalation log
//!
//! Authoritative record of every transition. The remote audit sink is a
//! best-effort mirror; this log is never rolled back or pruned.

use crate::types::{EscalationEvent, EventKind, SessionId};
use parking_lot::RwLock;
use tokio::sync::broadcast;

const SUBSCRIBER_BUFFER: usize = 64;

/// In-memory event log shared by the timer and its observers
#[derive(Debug)]
pub struct EscalationLog {
    events: RwLock<Vec<EscalationEvent>>,
    tx: broadcast::Sender<EscalationEvent>,
}

impl Default for EscalationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationLog {
    /// Empty log
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            events: RwLock::new(Vec::new()),
            tx,
        }
    }

    /// Append an event and publish it to subscribers
    pub fn append(&self, event: EscalationEvent) {
        tracing::info!(session = %event.session_id, kind = ?event.kind, "escalation event");
        self.events.write().push(event.clone());
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Live feed of appended events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EscalationEvent> {
        self.tx.subscribe()
    }

    /// Copy of every event in append order
    #[must_use]
    pub fn snapshot(&self) -> Vec<EscalationEvent> {
        self.events.read().clone()
    }

    /// Events of one session in append order
    #[must_use]
    pub fn for_session(&self, session_id: SessionId) -> Vec<EscalationEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Number of events of `kind` recorded for `session_id`
    #[must_use]
    pub fn count(&self, session_id: SessionId, kind: EventKind) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| e.session_id == session_id && e.kind == kind)
            .count()
    }

    /// Total number of events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether nothing was logged yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(session_id: SessionId, kind: EventKind) -> EscalationEvent {
        EscalationEvent {
            session_id,
            kind,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn keeps_append_order_per_session() {
        let log = EscalationLog::new();
        let a = SessionId::new();
        let b = SessionId::new();
        log.append(event(a, EventKind::Armed));
        log.append(event(b, EventKind::Armed));
        log.append(event(a, EventKind::CheckedIn));

        let kinds: Vec<_> = log.for_session(a).into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Armed, EventKind::CheckedIn]);
        assert_eq!(log.count(b, EventKind::Armed), 1);
        assert_eq!(log.len(), 3);
    }

    #[tokio::test]
    async fn subscribers_see_new_events() {
        let log = EscalationLog::new();
        let mut rx = log.subscribe();
        let id = SessionId::new();
        log.append(event(id, EventKind::Expired));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Expired);
    }
}
