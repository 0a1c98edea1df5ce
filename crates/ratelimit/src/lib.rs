//! Three rate-limit scopes composed — per-user-in-peer, per-peer, and
//! global — plus escalating temporary blocks for repeat offenders (§4.4).
//! A message is allowed only if every scope that applies to it passes.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use dashmap::DashMap;

#[cfg(feature = "metrics")]
use mudvault_metrics::{counter, ratelimit as ratelimit_metrics};

/// Escalation tiers applied to a peer after repeated violations (§4.4).
pub const BLOCK_TIERS: [Duration; 3] = [
    Duration::from_secs(5 * 60),
    Duration::from_secs(30 * 60),
    Duration::from_secs(24 * 60 * 60),
];

/// Consecutive violations (within [`RateLimitConfig::violation_window`])
/// before a peer is escalated to the next block tier.
const VIOLATIONS_PER_TIER: u32 = 5;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// `(mud, user)` budget, messages per minute.
    pub per_user_per_minute: u32,
    /// Per-peer budget is `per_user_per_minute * per_peer_multiplier`.
    pub per_peer_multiplier: u32,
    /// Global budget, messages per minute, across all peers.
    pub global_per_minute: u32,
    /// Window a violation streak resets after.
    pub violation_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_user_per_minute: 20,
            per_peer_multiplier: 10,
            global_per_minute: 2000,
            violation_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Decision {
    Allowed,
    Denied { retry_after: Duration },
}

/// A token bucket: `capacity` tokens, refilled continuously at
/// `capacity / 60` tokens/sec (the budget is always expressed per minute).
struct Bucket {
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity_per_minute: u32) -> Self {
        Self {
            capacity: f64::from(capacity_per_minute),
            tokens: f64::from(capacity_per_minute),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        let refill_per_sec = self.capacity / 60.0;
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(self.capacity);
    }

    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let refill_per_sec = self.capacity / 60.0;
            let deficit = 1.0 - self.tokens;
            let secs = if refill_per_sec > 0.0 {
                deficit / refill_per_sec
            } else {
                f64::from(u32::MAX)
            };
            Err(Duration::from_secs_f64(secs.max(0.0)))
        }
    }
}

struct PeerViolations {
    streak: u32,
    streak_started: Instant,
    tier: usize,
    blocked_until: Option<Instant>,
}

impl PeerViolations {
    fn new(now: Instant) -> Self {
        Self {
            streak: 0,
            streak_started: now,
            tier: 0,
            blocked_until: None,
        }
    }
}

/// Composed limiter over the three scopes in §4.4, with per-peer
/// escalating blocks for repeat violations.
pub struct RateLimiter {
    config: RateLimitConfig,
    user_buckets: DashMap<(String, String), Bucket>,
    peer_buckets: DashMap<String, Bucket>,
    global_bucket: Mutex<Bucket>,
    violations: DashMap<String, PeerViolations>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let global_budget = config.global_per_minute;
        Self {
            config,
            user_buckets: DashMap::new(),
            peer_buckets: DashMap::new(),
            global_bucket: Mutex::new(Bucket::new(global_budget)),
            violations: DashMap::new(),
        }
    }

    /// Check and consume one unit of budget for a message originating from
    /// `mud` (optionally `user`). All applicable scopes must pass.
    pub fn check(&self, mud: &str, user: Option<&str>) -> Decision {
        self.check_at(mud, user, Instant::now())
    }

    fn check_at(&self, mud: &str, user: Option<&str>, now: Instant) -> Decision {
        if let Some(v) = self.violations.get(mud)
            && let Some(until) = v.blocked_until
            && until > now
        {
            return self.deny(mud, now, until - now);
        }

        let mut worst: Option<Duration> = None;
        {
            #[allow(clippy::unwrap_used)]
            let mut global = self.global_bucket.lock().unwrap();
            if let Err(retry) = global.try_take(now) {
                worst = Some(worst.map_or(retry, |w: Duration| w.max(retry)));
            }
        }
        {
            let peer_cap = self.config.per_user_per_minute * self.config.per_peer_multiplier;
            let mut bucket = self
                .peer_buckets
                .entry(mud.to_string())
                .or_insert_with(|| Bucket::new(peer_cap));
            if let Err(retry) = bucket.try_take(now) {
                worst = Some(worst.map_or(retry, |w| w.max(retry)));
            }
        }
        if let Some(user) = user {
            let cap = self.config.per_user_per_minute;
            let mut bucket = self
                .user_buckets
                .entry((mud.to_string(), user.to_string()))
                .or_insert_with(|| Bucket::new(cap));
            if let Err(retry) = bucket.try_take(now) {
                worst = Some(worst.map_or(retry, |w| w.max(retry)));
            }
        }

        match worst {
            None => Decision::Allowed,
            Some(retry_after) => self.deny(mud, now, retry_after),
        }
    }

    fn deny(&self, mud: &str, now: Instant, retry_after: Duration) -> Decision {
        #[cfg(feature = "metrics")]
        counter!(ratelimit_metrics::REJECTIONS_TOTAL).increment(1);

        let mut entry = self
            .violations
            .entry(mud.to_string())
            .or_insert_with(|| PeerViolations::new(now));
        if now.saturating_duration_since(entry.streak_started) > self.config.violation_window {
            entry.streak = 0;
            entry.streak_started = now;
        }
        entry.streak += 1;
        if entry.streak >= VIOLATIONS_PER_TIER {
            entry.streak = 0;
            let tier_duration = BLOCK_TIERS[entry.tier.min(BLOCK_TIERS.len() - 1)];
            entry.blocked_until = Some(now + tier_duration);
            entry.tier = (entry.tier + 1).min(BLOCK_TIERS.len() - 1);
            tracing::warn!(mud, tier = entry.tier, "peer escalated to temporary block");
            return Decision::Denied {
                retry_after: tier_duration,
            };
        }
        Decision::Denied { retry_after }
    }

    /// Admin-initiated reset: clears a peer's (and, if given, a specific
    /// user's) counters and any active block (§4.4).
    pub fn reset(&self, mud: &str, user: Option<&str>) {
        self.peer_buckets.remove(mud);
        self.violations.remove(mud);
        if let Some(user) = user {
            self.user_buckets.remove(&(mud.to_string(), user.to_string()));
        } else {
            self.user_buckets.retain(|(m, _), _| m != mud);
        }
    }

    /// Snapshot of currently-blocked peers and their remaining block time,
    /// useful for an operator-facing status surface.
    #[must_use]
    pub fn blocked_peers(&self) -> HashMap<String, Duration> {
        let now = Instant::now();
        self.violations
            .iter()
            .filter_map(|entry| {
                entry
                    .blocked_until
                    .filter(|until| *until > now)
                    .map(|until| (entry.key().clone(), until - now))
            })
            .collect()
    }

    /// Evict per-subject buckets and violation streaks that haven't been
    /// touched in `idle_for`, so a long-running gateway doesn't accumulate
    /// an entry per MUD/user that has ever connected (§4.9 maintenance
    /// sweeps). Active blocks are kept regardless of idle time.
    pub fn sweep(&self, idle_for: Duration) {
        let now = Instant::now();
        self.user_buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < idle_for);
        self.peer_buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < idle_for);
        self.violations.retain(|_, v| {
            v.blocked_until.is_some_and(|until| until > now)
                || now.saturating_duration_since(v.streak_started) < idle_for
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_user: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            per_user_per_minute: per_user,
            per_peer_multiplier: 10,
            global_per_minute: 10_000,
            violation_window: Duration::from_secs(60),
        })
    }

    #[test]
    fn allows_within_budget_then_denies() {
        let rl = limiter(3);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(matches!(
                rl.check_at("Alpha", Some("ann"), now),
                Decision::Allowed
            ));
        }
        match rl.check_at("Alpha", Some("ann"), now) {
            Decision::Denied { retry_after } => assert!(retry_after.as_secs_f64() > 0.0),
            Decision::Allowed => panic!("fourth message should be rate limited"),
        }
    }

    #[test]
    fn refills_over_time() {
        let rl = limiter(60); // 1/sec
        let now = Instant::now();
        assert!(matches!(
            rl.check_at("Alpha", Some("ann"), now),
            Decision::Allowed
        ));
        // Immediately retry: < 1 token available.
        assert!(matches!(
            rl.check_at("Alpha", Some("ann"), now),
            Decision::Denied { .. }
        ));
        let later = now + Duration::from_secs(2);
        assert!(matches!(
            rl.check_at("Alpha", Some("ann"), later),
            Decision::Allowed
        ));
    }

    #[test]
    fn escalates_to_block_after_repeated_violations() {
        let rl = limiter(1);
        let now = Instant::now();
        assert!(matches!(
            rl.check_at("Alpha", Some("ann"), now),
            Decision::Allowed
        ));
        for _ in 0..VIOLATIONS_PER_TIER {
            rl.check_at("Alpha", Some("ann"), now);
        }
        match rl.check_at("Alpha", Some("ann"), now) {
            Decision::Denied { retry_after } => {
                assert!(retry_after >= BLOCK_TIERS[0]);
            },
            Decision::Allowed => panic!("expected a block after escalation"),
        }
    }

    #[test]
    fn reset_clears_block() {
        let rl = limiter(1);
        let now = Instant::now();
        for _ in 0..(VIOLATIONS_PER_TIER + 1) {
            rl.check_at("Alpha", Some("ann"), now);
        }
        assert!(!rl.blocked_peers().is_empty());
        rl.reset("Alpha", None);
        assert!(rl.blocked_peers().is_empty());
    }

    #[test]
    fn per_peer_budget_is_shared_across_users() {
        let rl = limiter(1);
        let now = Instant::now();
        assert!(matches!(
            rl.check_at("Alpha", Some("ann"), now),
            Decision::Allowed
        ));
        // Peer bucket (capacity 10) still has room even though ann's
        // personal bucket (capacity 1) is exhausted.
        match rl.check_at("Alpha", Some("bob"), now) {
            Decision::Allowed => {},
            Decision::Denied { .. } => panic!("bob has independent user budget"),
        }
    }

    #[test]
    fn sweep_evicts_idle_buckets_but_keeps_active_blocks() {
        let rl = limiter(1);
        let now = Instant::now();
        rl.check_at("Alpha", Some("ann"), now);
        for _ in 0..(VIOLATIONS_PER_TIER + 1) {
            rl.check_at("Beta", Some("bob"), now);
        }
        assert!(!rl.blocked_peers().is_empty());

        // Zero idle budget evicts anything not touched in this instant, but
        // an active block is kept regardless.
        rl.sweep(Duration::from_secs(0));

        assert!(rl.user_buckets.is_empty());
        assert!(!rl.violations.is_empty());
        assert!(!rl.blocked_peers().is_empty());
    }
}
