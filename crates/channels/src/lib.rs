//! Named multicast channels (§4.6): membership, a capped history ring, and
//! moderation (bans, optional allow-lists).
//!
//! Membership and history live in the shared store so every gateway
//! instance sees the same channel state; each mutating operation also
//! publishes a [`ChannelEvent`] on `channel:<name>:events`, a durable
//! record of the mutation independent of the history ring, for any future
//! consumer that wants to observe channel activity without polling
//! history. Per-member delivery itself (§4.8) is the router's job: it
//! re-sends the triggering envelope to each member's MUD once `join`,
//! `leave`, or `post` succeeds.

pub mod allowlist;
mod error;

use chrono::Utc;
use mudvault_store::{SharedStore, keys};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use error::{ChannelError, Result};

#[cfg(feature = "metrics")]
use mudvault_metrics::{channels as channel_metrics, counter};

/// Default history ring length (§4.6, "fixed length L (default 100)").
pub const DEFAULT_HISTORY_LENGTH: usize = 100;

/// Per-channel moderation and descriptive metadata, at `channel:<name>:meta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelMeta {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(default)]
    pub moderators: Vec<String>,
    #[serde(default)]
    pub bans: Vec<String>,
    /// Non-empty restricts membership to MUD names matching an entry
    /// (§4.6: "allow-list not containing `endpoint.mud`").
    #[serde(default)]
    pub allow_list: Vec<String>,
}

/// One history entry, appended to `channel:<name>:history` on join, leave,
/// or post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChannelRecord {
    Join { endpoint: String, at: String },
    Leave { endpoint: String, at: String },
    Message { endpoint: String, text: String, at: String },
}

/// Published on `channel:<name>:events` so the router can fan a mutation
/// out to locally-connected members without re-deriving it from history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel: String,
    #[serde(flatten)]
    pub record: ChannelRecord,
}

pub struct ChannelService {
    store: Arc<dyn SharedStore>,
    history_length: usize,
    require_join_to_post: bool,
}

impl ChannelService {
    #[must_use]
    pub fn new(
        store: Arc<dyn SharedStore>,
        history_length: usize,
        require_join_to_post: bool,
    ) -> Self {
        Self {
            store,
            history_length,
            require_join_to_post,
        }
    }

    /// A channel's moderation/descriptive metadata, for directory queries
    /// (`channels` extension, §9 supplemented features) as well as internal
    /// moderation checks.
    pub async fn meta(&self, channel: &str) -> Result<ChannelMeta> {
        match self.store.get(&keys::channel_meta(channel)).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(ChannelMeta::default()),
        }
    }

    async fn set_meta(&self, channel: &str, meta: &ChannelMeta) -> Result<()> {
        let json = serde_json::to_string(meta)?;
        self.store
            .set(&keys::channel_meta(channel), &json, None)
            .await?;
        Ok(())
    }

    /// Set (or clear) a channel's directory description, for the `channels`
    /// extension's `description` field (§6.1, §9 supplemented features).
    pub async fn set_description(&self, channel: &str, description: Option<String>) -> Result<()> {
        let mut meta = self.meta(channel).await?;
        meta.description = description;
        self.set_meta(channel, &meta).await
    }

    fn check_moderation(&self, meta: &ChannelMeta, endpoint: &str, mud: &str) -> Result<()> {
        if meta.bans.iter().any(|b| b.eq_ignore_ascii_case(endpoint)) {
            return Err(ChannelError::Banned);
        }
        if !allowlist::is_allowed(mud, &meta.allow_list) {
            return Err(ChannelError::NotAllowed);
        }
        Ok(())
    }

    /// Add `endpoint` (a `mud:user` string) to `channel`'s membership,
    /// append a join record, and publish the event. Rejected if banned or
    /// excluded by the channel's allow-list.
    pub async fn join(&self, channel: &str, endpoint: &str, mud: &str) -> Result<()> {
        let meta = self.meta(channel).await?;
        if let Err(e) = self.check_moderation(&meta, endpoint, mud) {
            #[cfg(feature = "metrics")]
            counter!(channel_metrics::MODERATION_REJECTIONS_TOTAL).increment(1);
            return Err(e);
        }

        self.store
            .sadd(&keys::channel_members(channel), endpoint)
            .await?;
        self.store.sadd(&keys::channels_index(), channel).await?;

        let record = ChannelRecord::Join {
            endpoint: endpoint.to_string(),
            at: Utc::now().to_rfc3339(),
        };
        self.append_and_publish(channel, record).await?;

        #[cfg(feature = "metrics")]
        {
            counter!(
                channel_metrics::MEMBERSHIP_CHANGES_TOTAL,
                mudvault_metrics::labels::ACTION => "join"
            )
            .increment(1);
            counter!(channel_metrics::ACTIVE).increment(1);
        }

        Ok(())
    }

    /// Remove `endpoint` from `channel`'s membership. Idempotent.
    pub async fn leave(&self, channel: &str, endpoint: &str) -> Result<()> {
        self.store
            .srem(&keys::channel_members(channel), endpoint)
            .await?;

        let record = ChannelRecord::Leave {
            endpoint: endpoint.to_string(),
            at: Utc::now().to_rfc3339(),
        };
        self.append_and_publish(channel, record).await?;

        #[cfg(feature = "metrics")]
        counter!(
            channel_metrics::MEMBERSHIP_CHANGES_TOTAL,
            mudvault_metrics::labels::ACTION => "leave"
        )
        .increment(1);

        Ok(())
    }

    /// Post `text` to `channel` on behalf of `endpoint`. Membership is
    /// required unless the service was built with `require_join_to_post =
    /// false`; moderation is re-checked on every post, not just at join.
    pub async fn post(&self, channel: &str, endpoint: &str, mud: &str, text: &str) -> Result<()> {
        let meta = self.meta(channel).await?;
        if let Err(e) = self.check_moderation(&meta, endpoint, mud) {
            #[cfg(feature = "metrics")]
            counter!(channel_metrics::MODERATION_REJECTIONS_TOTAL).increment(1);
            return Err(e);
        }

        if self.require_join_to_post
            && !self
                .store
                .sismember(&keys::channel_members(channel), endpoint)
                .await?
        {
            return Err(ChannelError::NotMember);
        }

        let record = ChannelRecord::Message {
            endpoint: endpoint.to_string(),
            text: text.to_string(),
            at: Utc::now().to_rfc3339(),
        };
        self.append_and_publish(channel, record).await?;

        #[cfg(feature = "metrics")]
        counter!(channel_metrics::POSTS_TOTAL).increment(1);

        Ok(())
    }

    /// Last `limit` history records (capped to the ring's configured
    /// length regardless of what's asked for).
    pub async fn history(&self, channel: &str, limit: usize) -> Result<Vec<ChannelRecord>> {
        let limit = limit.min(self.history_length);
        let raw = self
            .store
            .lrange(&keys::channel_history(channel), limit)
            .await?;
        raw.iter()
            .map(|s| serde_json::from_str(s).map_err(ChannelError::from))
            .collect()
    }

    /// Current membership set.
    pub async fn members(&self, channel: &str) -> Result<Vec<String>> {
        Ok(self.store.smembers(&keys::channel_members(channel)).await?)
    }

    /// All known channel names, for directory queries (`channels`
    /// extension, §9 supplemented features).
    pub async fn known_channels(&self) -> Result<Vec<String>> {
        Ok(self.store.smembers(&keys::channels_index()).await?)
    }

    /// Ban `endpoint` from `channel`, evicting it from membership if
    /// currently joined.
    pub async fn ban(&self, channel: &str, endpoint: &str) -> Result<()> {
        let mut meta = self.meta(channel).await?;
        if !meta.bans.iter().any(|b| b == endpoint) {
            meta.bans.push(endpoint.to_string());
        }
        self.set_meta(channel, &meta).await?;
        self.store
            .srem(&keys::channel_members(channel), endpoint)
            .await?;
        Ok(())
    }

    async fn append_and_publish(&self, channel: &str, record: ChannelRecord) -> Result<()> {
        let json = serde_json::to_string(&record)?;
        self.store
            .lpush_capped(&keys::channel_history(channel), &json, self.history_length)
            .await?;

        let event = ChannelEvent {
            channel: channel.to_string(),
            record,
        };
        let payload = serde_json::to_string(&event)?;
        self.store
            .publish(&keys::channel_events(channel), &payload)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mudvault_store::memory::InMemoryStore;

    use super::*;

    fn service() -> ChannelService {
        ChannelService::new(InMemoryStore::new(), 4, true)
    }

    #[tokio::test]
    async fn join_then_post_then_history() {
        let svc = service();
        svc.join("gossip", "Alpha:ann", "Alpha").await.unwrap();
        svc.post("gossip", "Alpha:ann", "Alpha", "hello").await.unwrap();

        let members = svc.members("gossip").await.unwrap();
        assert_eq!(members, vec!["Alpha:ann".to_string()]);

        let history = svc.history("gossip", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(matches!(history[0], ChannelRecord::Message { .. }));
    }

    #[tokio::test]
    async fn post_without_join_rejected_when_required() {
        let svc = service();
        let err = svc
            .post("gossip", "Alpha:ann", "Alpha", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotMember));
    }

    #[tokio::test]
    async fn post_without_join_allowed_when_not_required() {
        let svc = ChannelService::new(InMemoryStore::new(), 4, false);
        svc.post("gossip", "Alpha:ann", "Alpha", "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let svc = service();
        svc.leave("gossip", "Alpha:ann").await.unwrap();
        svc.leave("gossip", "Alpha:ann").await.unwrap();
        assert!(svc.members("gossip").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_ring_is_capped() {
        let svc = service();
        svc.join("gossip", "Alpha:ann", "Alpha").await.unwrap();
        for i in 0..10 {
            svc.post("gossip", "Alpha:ann", "Alpha", &format!("msg {i}"))
                .await
                .unwrap();
        }
        let history = svc.history("gossip", 100).await.unwrap();
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn ban_rejects_join_and_post() {
        let svc = service();
        svc.join("gossip", "Alpha:ann", "Alpha").await.unwrap();
        svc.ban("gossip", "Alpha:ann").await.unwrap();
        assert!(svc.members("gossip").await.unwrap().is_empty());

        let err = svc
            .join("gossip", "Alpha:ann", "Alpha")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Banned));
    }

    #[tokio::test]
    async fn allow_list_restricts_membership() {
        let svc = service();
        let mut meta = ChannelMeta::default();
        meta.allow_list = vec!["Alpha".to_string()];
        svc.set_meta("gossip", &meta).await.unwrap();

        svc.join("gossip", "Alpha:ann", "Alpha").await.unwrap();
        let err = svc.join("gossip", "Beta:bob", "Beta").await.unwrap_err();
        assert!(matches!(err, ChannelError::NotAllowed));
    }

    #[tokio::test]
    async fn known_channels_tracks_joined_channels() {
        let svc = service();
        svc.join("gossip", "Alpha:ann", "Alpha").await.unwrap();
        svc.join("ooc", "Alpha:ann", "Alpha").await.unwrap();
        let mut channels = svc.known_channels().await.unwrap();
        channels.sort();
        assert_eq!(channels, vec!["gossip".to_string(), "ooc".to_string()]);
    }
}
