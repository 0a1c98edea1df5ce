//! Timestamp helpers shared by the protocol codec, TTL checks, and the
//! heartbeat timer.

use chrono::{DateTime, Utc};

/// Current UTC instant, ISO-8601 formatted — the wire representation of
/// `envelope.timestamp`.
#[must_use]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Current Unix timestamp in seconds — used by the heartbeat timer, which
/// deals in monotonic-ish integers rather than formatted strings.
#[must_use]
pub fn now_unix_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

/// Parse an ISO-8601 timestamp as produced by [`now_iso8601`] or any
/// RFC 3339-compliant peer.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `true` if `timestamp` is older than `ttl_secs` relative to now — the
/// router's expiry check (§3, §4.8).
#[must_use]
pub fn is_expired(timestamp: &str, ttl_secs: u32) -> bool {
    let Some(origin) = parse_iso8601(timestamp) else {
        // Unparseable timestamps are treated as already expired so malformed
        // envelopes don't linger in send queues.
        return true;
    };
    let age = Utc::now().signed_duration_since(origin);
    age.num_seconds() > i64::from(ttl_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_now() {
        let s = now_iso8601();
        assert!(parse_iso8601(&s).is_some());
    }

    #[test]
    fn fresh_timestamp_not_expired() {
        assert!(!is_expired(&now_iso8601(), 60));
    }

    #[test]
    fn old_timestamp_expired() {
        let old = (Utc::now() - chrono::Duration::seconds(120)).to_rfc3339();
        assert!(is_expired(&old, 60));
    }

    #[test]
    fn garbage_timestamp_is_expired() {
        assert!(is_expired("not-a-timestamp", 60));
    }
}
