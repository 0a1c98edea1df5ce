//! Shared-state adapter: the thin contract over an external key-value +
//! pub/sub store that lets multiple gateway instances share channel
//! membership, presence, and roster state (§4.2, §6.3).
//!
//! [`SharedStore`] is intentionally small — get/set/del with TTL, set ops,
//! a capped-list op pair, and publish/subscribe. [`memory::InMemoryStore`]
//! backs single-instance deployments and tests; the `redis` feature adds
//! [`redis_backend::RedisStore`] for multi-gateway deployments, grounded on
//! the pattern in the pack's `spectacles-cache` Redis backend.

pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;

use std::time::Duration;

use async_trait::async_trait;

pub use error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// A single message delivered on a subscribed pub/sub channel.
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: String,
}

/// Contract every backend (`redis`, in-memory) must satisfy. All operations
/// are async and may fail with [`StoreError::Unavailable`]; callers must
/// handle that per §7 (serve reads from local cache, buffer writes up to a
/// bound, then surface `INTERNAL_ERROR`).
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;

    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn srem(&self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    /// Push `value` onto the head of the list at `key`, then trim the list
    /// to `cap` entries — trim happens on the *same code path*, after the
    /// push, per §9's open-question resolution on history ring-trim timing.
    async fn lpush_capped(&self, key: &str, value: &str, cap: usize) -> Result<()>;
    async fn lrange(&self, key: &str, limit: usize) -> Result<Vec<String>>;

    /// Publish `payload` on `channel`. Delivery to subscribers is
    /// best-effort; a publish with no live subscribers is not an error.
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;

    /// Subscribe to `channel`, returning a stream of messages. Per §4.2 a
    /// duplicate connection backs subscriptions so request/response traffic
    /// is never blocked behind pub/sub delivery.
    async fn subscribe(&self, channel: &str) -> Result<tokio::sync::mpsc::Receiver<PubSubMessage>>;

    /// Fires whenever the backend has reconnected after an outage, signaling
    /// that local caches should be reconciled from the store (§4.2).
    async fn reconciled(&self) -> tokio::sync::watch::Receiver<u64>;
}

/// Well-known key builders (§6.3), kept in one place so every caller agrees
/// on the layout.
pub mod keys {
    #[must_use]
    pub fn connected_muds() -> String {
        "connected_muds".to_string()
    }

    #[must_use]
    pub fn mud_info(name: &str) -> String {
        format!("mud_info:{name}")
    }

    #[must_use]
    pub fn channel_members(channel: &str) -> String {
        format!("channel:{channel}:members")
    }

    #[must_use]
    pub fn channel_history(channel: &str) -> String {
        format!("channel:{channel}:history")
    }

    #[must_use]
    pub fn channel_meta(channel: &str) -> String {
        format!("channel:{channel}:meta")
    }

    #[must_use]
    pub fn presence(mud: &str, user: &str) -> String {
        format!("presence:{mud}:{user}")
    }

    #[must_use]
    pub fn route(mud: &str) -> String {
        format!("route:{mud}")
    }

    #[must_use]
    pub fn outbound_messages() -> String {
        "outbound_messages".to_string()
    }

    /// Pub/sub channel sibling gateways subscribe to for presence fan-out.
    #[must_use]
    pub fn presence_channel() -> String {
        "presence".to_string()
    }

    /// Bearer session metadata (mud name, issued-at, expiry), TTL-backed.
    #[must_use]
    pub fn session(token: &str) -> String {
        format!("session:{token}")
    }

    /// Hashed long-lived API key for a registered MUD.
    #[must_use]
    pub fn apikey(mud_name: &str) -> String {
        format!("apikey:{mud_name}")
    }

    /// Known channel names, so directory queries don't need to scan.
    #[must_use]
    pub fn channels_index() -> String {
        "channels".to_string()
    }

    /// Pub/sub topic a channel's posts are fanned out on; gateways with
    /// locally-connected members subscribe and perform local delivery.
    #[must_use]
    pub fn channel_events(channel: &str) -> String {
        format!("channel:{channel}:events")
    }
}
