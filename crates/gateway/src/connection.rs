//! Per-connection state machine and bounded outbound queue (§4.7).

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
};

use mudvault_protocol::envelope::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Live,
    Draining,
    Closed,
}

/// Bounded, priority-aware outbound send queue.
///
/// When full, an enqueue evicts the oldest entry whose priority is at most
/// the incoming message's priority (§4.7: "drop-oldest-of-same-priority
/// (honoring envelope `metadata.priority`: higher numbers preempt)"). A
/// message that can't displace anything — because every queued entry
/// outranks it — is itself dropped.
pub struct OutboundQueue {
    capacity: usize,
    entries: Mutex<VecDeque<Envelope>>,
}

pub enum EnqueueOutcome {
    Queued,
    DroppedExisting(Envelope),
    DroppedIncoming,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, envelope: Envelope) -> EnqueueOutcome {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if entries.len() < self.capacity {
            entries.push_back(envelope);
            return EnqueueOutcome::Queued;
        }

        let priority = envelope.metadata.priority;
        let evict_at = entries
            .iter()
            .position(|queued| queued.metadata.priority <= priority);

        match evict_at {
            Some(idx) => {
                #[allow(clippy::unwrap_used)]
                let dropped = entries.remove(idx).unwrap();
                entries.push_back(envelope);
                EnqueueOutcome::DroppedExisting(dropped)
            },
            None => EnqueueOutcome::DroppedIncoming,
        }
    }

    pub fn pop(&self) -> Option<Envelope> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Monotonic heartbeat clock for one connection: the timestamp of the last
/// `ping` sent and the last `pong` received, both as Unix seconds.
pub struct Heartbeat {
    last_ping_sent: AtomicU64,
    last_pong_received: AtomicU64,
}

impl Heartbeat {
    #[must_use]
    pub fn new(now: u64) -> Self {
        Self {
            last_ping_sent: AtomicU64::new(now),
            last_pong_received: AtomicU64::new(now),
        }
    }

    pub fn record_ping_sent(&self, now: u64) {
        self.last_ping_sent.store(now, Ordering::Relaxed);
    }

    pub fn record_pong_received(&self, now: u64) {
        self.last_pong_received.store(now, Ordering::Relaxed);
    }

    /// `true` if more than `2 * interval_secs` have elapsed since the last
    /// `pong`, per §4.7's liveness bound.
    #[must_use]
    pub fn is_stale(&self, now: u64, interval_secs: u64) -> bool {
        let last = self.last_pong_received.load(Ordering::Relaxed);
        now.saturating_sub(last) > 2 * interval_secs
    }
}

/// Counts consecutive malformed/invalid frames within a sliding window, so a
/// connection is closed after `threshold` of them in `window_secs` rather
/// than on the first one (§4.1, §7: a single validation failure only gets an
/// `error(1000)` reply).
pub struct MalformedFrameTracker {
    window_start: AtomicU64,
    count: AtomicU32,
}

impl MalformedFrameTracker {
    #[must_use]
    pub fn new(now: u64) -> Self {
        Self {
            window_start: AtomicU64::new(now),
            count: AtomicU32::new(0),
        }
    }

    /// Record a malformed frame at `now`. Returns `true` once `threshold`
    /// frames have landed inside the current `window_secs` window, in which
    /// case the caller should close the connection.
    pub fn record(&self, now: u64, threshold: u32, window_secs: u64) -> bool {
        let start = self.window_start.load(Ordering::Relaxed);
        if now.saturating_sub(start) > window_secs {
            self.window_start.store(now, Ordering::Relaxed);
            self.count.store(1, Ordering::Relaxed);
            return threshold <= 1;
        }
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        count >= threshold
    }
}

#[cfg(test)]
mod tests {
    use mudvault_protocol::envelope::{Endpoint, MessageType};

    use super::*;

    fn env_with_priority(priority: u8) -> Envelope {
        let mut e = Envelope::new(
            MessageType::Tell,
            Endpoint::mud("Alpha"),
            Endpoint::mud("Beta"),
            serde_json::json!({"message": "hi"}),
        );
        e.metadata.priority = priority;
        e
    }

    #[test]
    fn queues_while_under_capacity() {
        let q = OutboundQueue::new(2);
        assert!(matches!(q.push(env_with_priority(5)), EnqueueOutcome::Queued));
        assert!(matches!(q.push(env_with_priority(5)), EnqueueOutcome::Queued));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn full_queue_evicts_oldest_same_or_lower_priority() {
        let q = OutboundQueue::new(2);
        q.push(env_with_priority(5));
        q.push(env_with_priority(5));
        let outcome = q.push(env_with_priority(5));
        assert!(matches!(outcome, EnqueueOutcome::DroppedExisting(_)));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn higher_priority_cannot_be_displaced_by_lower() {
        let q = OutboundQueue::new(1);
        q.push(env_with_priority(9));
        let outcome = q.push(env_with_priority(1));
        assert!(matches!(outcome, EnqueueOutcome::DroppedIncoming));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn heartbeat_is_stale_after_two_intervals() {
        let hb = Heartbeat::new(0);
        assert!(!hb.is_stale(59, 30));
        assert!(hb.is_stale(61, 30));
    }

    #[test]
    fn recorded_pong_resets_staleness() {
        let hb = Heartbeat::new(0);
        hb.record_pong_received(50);
        assert!(!hb.is_stale(100, 30));
    }

    #[test]
    fn malformed_tracker_stays_quiet_under_threshold() {
        let tracker = MalformedFrameTracker::new(0);
        assert!(!tracker.record(0, 3, 60));
        assert!(!tracker.record(1, 3, 60));
    }

    #[test]
    fn malformed_tracker_trips_at_threshold_within_window() {
        let tracker = MalformedFrameTracker::new(0);
        assert!(!tracker.record(0, 3, 60));
        assert!(!tracker.record(10, 3, 60));
        assert!(tracker.record(20, 3, 60));
    }

    #[test]
    fn malformed_tracker_resets_once_window_elapses() {
        let tracker = MalformedFrameTracker::new(0);
        assert!(!tracker.record(0, 2, 60));
        assert!(tracker.record(10, 2, 60));
        // a new window starts here, clearing the streak
        assert!(!tracker.record(200, 2, 60));
    }
}
