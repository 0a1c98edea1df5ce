//! MUD name → connection registry, enforcing the one-LIVE-connection-per-MUD
//! policy and implementing [`mudvault_routing::LocalConnections`] so the
//! router can deliver without knowing about transports.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use dashmap::DashMap;
use mudvault_config::DuplicateMudPolicy;
use mudvault_protocol::envelope::Envelope;
use mudvault_routing::LocalConnections;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::connection::{Heartbeat, MalformedFrameTracker, OutboundQueue};

/// A LIVE connection's handle, as seen by the registry and the router.
pub struct ConnectionHandle {
    /// Unique per connection instance, so a [`DuplicateMudPolicy::DisplaceOld`]
    /// eviction can't be confused with the connection that replaced it — two
    /// connections can share `mud` (briefly, during displacement) but never
    /// `id`.
    pub id: Uuid,
    pub mud: String,
    pub outbound: Arc<OutboundQueue>,
    pub wake: mpsc::UnboundedSender<()>,
    pub heartbeat: Arc<Heartbeat>,
    /// Cancelled to force this connection into DRAINING, e.g. when
    /// [`DuplicateMudPolicy::DisplaceOld`] evicts it for a newcomer.
    pub cancel: CancellationToken,
    /// Users this MUD has reported `online`/`away`/`busy` via a `presence`
    /// envelope, so a CLOSED transition can mark exactly those users
    /// offline (§8 scenario 6) rather than guessing or skipping it.
    online_users: Mutex<HashSet<String>>,
    malformed: MalformedFrameTracker,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(
        mud: String,
        outbound: Arc<OutboundQueue>,
        wake: mpsc::UnboundedSender<()>,
        heartbeat: Arc<Heartbeat>,
        cancel: CancellationToken,
    ) -> Self {
        let now = mudvault_common::time::now_unix_secs();
        Self {
            id: Uuid::new_v4(),
            mud,
            outbound,
            wake,
            heartbeat,
            cancel,
            online_users: Mutex::new(HashSet::new()),
            malformed: MalformedFrameTracker::new(now),
        }
    }

    /// Record that this connection reported `user` online (or no longer
    /// online) via a `presence` envelope.
    pub fn note_presence(&self, user: &str, online: bool) {
        let mut users = self
            .online_users
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if online {
            users.insert(user.to_string());
        } else {
            users.remove(user);
        }
    }

    /// Users this connection last reported online, for use when it closes
    /// (§8 scenario 6).
    #[must_use]
    pub fn online_users_snapshot(&self) -> Vec<String> {
        self.online_users
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Record a malformed/invalid frame on this connection. Returns `true`
    /// once `threshold` such frames have landed within `window_secs`,
    /// meaning the caller should close the connection (§4.1, §7).
    pub fn note_malformed_frame(&self, now: u64, threshold: u32, window_secs: u64) -> bool {
        self.malformed.record(now, threshold, window_secs)
    }
}

pub struct ConnectionRegistry {
    policy: DuplicateMudPolicy,
    by_mud: DashMap<String, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(policy: DuplicateMudPolicy) -> Self {
        Self {
            policy,
            by_mud: DashMap::new(),
        }
    }

    /// Register a newly-authenticated connection as LIVE for `mud`.
    ///
    /// On a policy conflict (an existing LIVE connection for the same MUD):
    /// [`DuplicateMudPolicy::RefuseNew`] rejects the newcomer (`Err` returns
    /// the existing handle so the caller can explain the refusal);
    /// [`DuplicateMudPolicy::DisplaceOld`] evicts the incumbent, returning
    /// it as `Ok(Some(..))` so the caller can cancel it.
    pub fn register(
        &self,
        mud: &str,
        handle: Arc<ConnectionHandle>,
    ) -> Result<Option<Arc<ConnectionHandle>>, Arc<ConnectionHandle>> {
        if let Some(existing) = self.by_mud.get(mud) {
            match self.policy {
                DuplicateMudPolicy::RefuseNew => return Err(existing.clone()),
                DuplicateMudPolicy::DisplaceOld => {
                    info!(mud, "displacing existing connection per duplicate_mud_policy");
                    let displaced = existing.clone();
                    drop(existing);
                    self.by_mud.insert(mud.to_string(), handle);
                    return Ok(Some(displaced));
                },
            }
        }
        self.by_mud.insert(mud.to_string(), handle);
        Ok(None)
    }

    /// Remove `mud`'s registration, but only if the connection currently
    /// registered for it is still `id` — i.e. no newer connection has since
    /// displaced it. An evicted [`DuplicateMudPolicy::DisplaceOld`] loser
    /// tearing down after the fact must not be allowed to delete the
    /// survivor's registration out from under it. Returns `true` if this
    /// connection was in fact the one removed, so the caller knows whether
    /// it should also retire the MUD's shared-store roster entry.
    pub fn deregister(&self, mud: &str, id: Uuid) -> bool {
        self.by_mud
            .remove_if(mud, |_, handle| handle.id == id)
            .is_some()
    }

    #[must_use]
    pub fn get(&self, mud: &str) -> Option<Arc<ConnectionHandle>> {
        self.by_mud.get(mud).map(|e| e.clone())
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.by_mud.len()
    }

}

#[async_trait]
impl LocalConnections for ConnectionRegistry {
    async fn is_local(&self, mud: &str) -> bool {
        self.by_mud.contains_key(mud)
    }

    async fn deliver(&self, mud: &str, envelope: &Envelope) -> bool {
        let Some(handle) = self.get(mud) else {
            return false;
        };
        handle.outbound.push(envelope.clone());
        handle.wake.send(()).is_ok()
    }

    async fn note_pong(&self, mud: &str, _timestamp: u64) {
        if let Some(handle) = self.get(mud) {
            handle
                .heartbeat
                .record_pong_received(mudvault_common::time::now_unix_secs());
        }
    }
}
