//! User registry: presence records and cross-gateway `locate` (§4.5).
//!
//! A presence record lives in the shared store under `presence:<mud>:<user>`
//! with a TTL, so a gateway that crashes without sending an `offline` update
//! eventually stops showing that user online. `locate` has no secondary
//! index to walk in the store's small command set, so it fans out across
//! `connected_muds` and reads each MUD's record for the user directly.

mod error;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use mudvault_protocol::payload::{LocateResult, PresenceStatus};
use mudvault_store::{SharedStore, keys};
use serde::{Deserialize, Serialize};

pub use error::{PresenceError, Result};

#[cfg(feature = "metrics")]
use mudvault_metrics::{counter, presence as presence_metrics};

/// How long a presence record survives without a refresh before the store
/// expires it and the user is treated as offline.
pub const PRESENCE_TTL: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,
    pub updated_at: String,
}

/// Message published on the `presence` pub/sub channel so sibling gateways
/// can invalidate or refresh their local presence caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub mud: String,
    pub user: String,
    #[serde(flatten)]
    pub record: PresenceRecord,
}

pub struct PresenceRegistry {
    store: Arc<dyn SharedStore>,
}

impl PresenceRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Apply a `presence` envelope: write the record and publish the update.
    pub async fn update(
        &self,
        mud: &str,
        user: &str,
        status: PresenceStatus,
        activity: Option<String>,
        location: Option<String>,
    ) -> Result<()> {
        let record = PresenceRecord {
            status,
            activity,
            location,
            updated_at: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string(&record)?;
        self.store
            .set(&keys::presence(mud, user), &json, Some(PRESENCE_TTL))
            .await?;

        let update = PresenceUpdate {
            mud: mud.to_string(),
            user: user.to_string(),
            record,
        };
        let payload = serde_json::to_string(&update)?;
        self.store
            .publish(&keys::presence_channel(), &payload)
            .await?;

        #[cfg(feature = "metrics")]
        counter!(presence_metrics::UPDATES_TOTAL).increment(1);

        Ok(())
    }

    /// Mark every user previously reported online by `mud` as offline. Used
    /// when a MUD's connection closes (§8 scenario 6): presence entries for
    /// that MUD's users must not linger as stale "online" after a
    /// disconnect, even before their TTL naturally expires.
    pub async fn mark_mud_offline(&self, mud: &str, users: &[String]) -> Result<()> {
        for user in users {
            self.update(mud, user, PresenceStatus::Offline, None, None)
                .await?;
        }
        Ok(())
    }

    /// Walk every currently-connected MUD's record for `user` and return the
    /// locations where that user is known.
    pub async fn locate(&self, user: &str) -> Result<Vec<LocateResult>> {
        let muds = self.store.smembers(&keys::connected_muds()).await?;
        let mut results = Vec::new();
        for mud in muds {
            let Some(json) = self.store.get(&keys::presence(&mud, user)).await? else {
                continue;
            };
            let record: PresenceRecord = serde_json::from_str(&json)?;
            results.push(LocateResult {
                mud,
                online: !matches!(record.status, PresenceStatus::Offline),
                room: record.location,
                area: None,
            });
        }
        Ok(results)
    }

    /// Current record for a single `(mud, user)`, used when rendering a
    /// `who` response from locally-held data rather than forwarding.
    pub async fn get(&self, mud: &str, user: &str) -> Result<Option<PresenceRecord>> {
        let Some(json) = self.store.get(&keys::presence(mud, user)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&json)?))
    }
}

#[cfg(test)]
mod tests {
    use mudvault_store::memory::InMemoryStore;

    use super::*;

    fn registry() -> PresenceRegistry {
        PresenceRegistry::new(InMemoryStore::new())
    }

    #[tokio::test]
    async fn update_then_get_round_trips() {
        let reg = registry();
        reg.update(
            "Alpha",
            "ann",
            PresenceStatus::Online,
            Some("exploring".to_string()),
            Some("town square".to_string()),
        )
        .await
        .unwrap();

        let record = reg.get("Alpha", "ann").await.unwrap().unwrap();
        assert_eq!(record.status, PresenceStatus::Online);
        assert_eq!(record.location.as_deref(), Some("town square"));
    }

    #[tokio::test]
    async fn locate_walks_connected_muds() {
        let store = InMemoryStore::new();
        store
            .sadd(&keys::connected_muds(), "Alpha")
            .await
            .unwrap();
        store.sadd(&keys::connected_muds(), "Beta").await.unwrap();
        let reg = PresenceRegistry::new(store);

        reg.update("Alpha", "ann", PresenceStatus::Online, None, None)
            .await
            .unwrap();

        let locations = reg.locate("ann").await.unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].mud, "Alpha");
        assert!(locations[0].online);
    }

    #[tokio::test]
    async fn locate_finds_nothing_for_unknown_user() {
        let reg = registry();
        let locations = reg.locate("nobody").await.unwrap();
        assert!(locations.is_empty());
    }

    #[tokio::test]
    async fn mark_mud_offline_flips_status() {
        let reg = registry();
        reg.update("Alpha", "ann", PresenceStatus::Online, None, None)
            .await
            .unwrap();
        reg.mark_mud_offline("Alpha", &["ann".to_string()])
            .await
            .unwrap();

        let record = reg.get("Alpha", "ann").await.unwrap().unwrap();
        assert_eq!(record.status, PresenceStatus::Offline);
    }
}
