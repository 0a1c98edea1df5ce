//! Router: the single envelope dispatch entry point (§4.8).
//!
//! `Router::dispatch` expires stale envelopes, stamps the authoritative
//! sender identity, applies the rate limiter, and then applies a
//! type-specific routing rule. Local delivery is abstracted behind
//! [`LocalConnections`] since the connection registry itself is owned by
//! the gateway crate, which depends on this one rather than the reverse.

mod error;

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use mudvault_channels::ChannelService;
use mudvault_presence::PresenceRegistry;
use mudvault_protocol::{
    ErrorCode, ErrorPayload,
    envelope::{Endpoint, Envelope, MessageType},
    payload::{ChannelAction, ChannelPayload, Payload, PingPongPayload},
};
use mudvault_ratelimit::{Decision, RateLimiter};
use mudvault_store::{SharedStore, keys};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use error::{Result, RoutingError};

#[cfg(feature = "metrics")]
use mudvault_metrics::{counter, histogram, labels, routing as routing_metrics};

/// Public per-MUD metadata at `mud_info:<name>` (§6.3), written once a
/// connection authenticates and read back for `mudlist` directory answers.
/// Unlike `connected_muds`, this isn't removed on disconnect — a `mudlist`
/// response can still report a MUD's last-known host alongside
/// `online: false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MudInfo {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub host: Option<String>,
}

/// Gateway-owned connection registry, as seen by the router. Implemented by
/// the gateway crate's connection manager.
#[async_trait]
pub trait LocalConnections: Send + Sync {
    /// `true` if `mud` currently has a LIVE connection to this instance.
    async fn is_local(&self, mud: &str) -> bool;

    /// Attempt to enqueue `envelope` on the connection authenticated as
    /// `mud`. Returns `false` if no such connection exists (it may have
    /// closed between the `is_local` check and this call).
    async fn deliver(&self, mud: &str, envelope: &Envelope) -> bool;

    /// Record that `mud`'s connection just received a `pong` carrying
    /// `timestamp`, resetting its heartbeat deadline.
    async fn note_pong(&self, mud: &str, timestamp: u64);
}

pub struct Router {
    store: Arc<dyn SharedStore>,
    channels: Arc<ChannelService>,
    presence: Arc<PresenceRegistry>,
    ratelimit: Arc<RateLimiter>,
}

impl Router {
    #[must_use]
    pub fn new(
        store: Arc<dyn SharedStore>,
        channels: Arc<ChannelService>,
        presence: Arc<PresenceRegistry>,
        ratelimit: Arc<RateLimiter>,
    ) -> Self {
        Self {
            store,
            channels,
            presence,
            ratelimit,
        }
    }

    /// Route one envelope received on `source_mud`'s connection. Returns an
    /// envelope to send back to the source, if the routing rule for this
    /// type produces one (an error, a generated `pong`, a directory
    /// response, …) — every other effect (forwarding, fan-out, registry
    /// updates) happens as a side effect before this returns.
    pub async fn dispatch(
        &self,
        mut envelope: Envelope,
        source_mud: &str,
        local: &dyn LocalConnections,
    ) -> Option<Envelope> {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        envelope.from.mud = source_mud.to_string();

        if mudvault_common::time::is_expired(&envelope.timestamp, envelope.metadata.ttl) {
            #[cfg(feature = "metrics")]
            counter!(
                routing_metrics::MESSAGES_DROPPED_TOTAL,
                labels::REASON => "ttl_expired"
            )
            .increment(1);
            debug!(mud = source_mud, id = %envelope.id, "dropping expired envelope");
            return None;
        }

        match self.ratelimit.check(source_mud, envelope.from.user.as_deref()) {
            Decision::Allowed => {},
            Decision::Denied { retry_after } => {
                return Some(self.error_reply(
                    &envelope,
                    ErrorCode::RateLimited,
                    Some(serde_json::json!({ "retryAfterSeconds": retry_after.as_secs() })),
                ));
            },
        }

        let reply = self.dispatch_by_type(envelope.clone(), local).await;

        #[cfg(feature = "metrics")]
        {
            counter!(
                routing_metrics::MESSAGES_ROUTED_TOTAL,
                labels::MESSAGE_TYPE => message_type_label(envelope.r#type)
            )
            .increment(1);
            histogram!(routing_metrics::DISPATCH_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
        }

        reply
    }

    async fn dispatch_by_type(
        &self,
        envelope: Envelope,
        local: &dyn LocalConnections,
    ) -> Option<Envelope> {
        match envelope.r#type {
            MessageType::Tell | MessageType::Emoteto => {
                self.unicast(&envelope, local).await
            },
            MessageType::Emote => {
                if envelope.to.user.is_some() {
                    self.unicast(&envelope, local).await
                } else {
                    // Local broadcast within `to.mud` (§4.8): delivery to the
                    // single connection representing that MUD, which fans it
                    // out to its own users.
                    self.unicast(&envelope, local).await
                }
            },
            MessageType::Channel => self.dispatch_channel(envelope, local).await,
            MessageType::Locate if is_request(&envelope) => {
                self.answer_locate(&envelope).await
            },
            MessageType::Who | MessageType::Finger | MessageType::Locate => {
                self.unicast(&envelope, local).await
            },
            MessageType::Presence => {
                self.apply_presence(&envelope).await;
                None
            },
            MessageType::Ping => Some(self.reply_pong(&envelope)),
            MessageType::Pong => {
                if let Ok(Payload::Pong(PingPongPayload { timestamp })) =
                    Payload::parse(MessageType::Pong, &envelope.payload)
                {
                    local.note_pong(&envelope.from.mud, timestamp).await;
                }
                None
            },
            MessageType::Error => {
                let _ = self.unicast(&envelope, local).await;
                None
            },
            MessageType::Auth => {
                warn!(mud = %envelope.from.mud, "auth envelope reached the router; should have been handled by the connection manager");
                None
            },
            MessageType::Mudlist => self.answer_mudlist(&envelope).await,
            MessageType::Channels => self.answer_channels(&envelope).await,
        }
    }

    /// Deliver `envelope` to the connection for `to.mud`, locally or via the
    /// shared store's pub/sub forwarding channel. `to.mud = "*"` (§3) fans
    /// the envelope out to every connected MUD except the sender instead of
    /// a single destination. Returns a `MUD_NOT_FOUND` reply if a specific
    /// destination isn't connected anywhere; broadcast never produces one.
    async fn unicast(&self, envelope: &Envelope, local: &dyn LocalConnections) -> Option<Envelope> {
        if envelope.to.is_broadcast() {
            self.broadcast(envelope, local).await;
            return None;
        }

        match self.forward_to_mud(envelope, &envelope.to.mud, local).await {
            Ok(true) => None,
            Ok(false) => Some(self.error_reply(envelope, ErrorCode::MudNotFound, None)),
            Err(e) => {
                warn!(error = %e, "unicast forward failed");
                Some(self.error_reply(envelope, ErrorCode::InternalError, None))
            },
        }
    }

    /// Deliver `envelope` to every MUD in `connected_muds` other than its
    /// own sender (§3's `to.mud = "*"` broadcast).
    async fn broadcast(&self, envelope: &Envelope, local: &dyn LocalConnections) {
        let muds = self.store.smembers(&keys::connected_muds()).await.unwrap_or_default();
        for mud in muds {
            if mud == envelope.from.mud {
                continue;
            }
            if let Err(e) = self.forward_to_mud(envelope, &mud, local).await {
                warn!(error = %e, mud, "broadcast delivery failed");
            }
        }
    }

    /// `true` if `target_mud` was reachable and the envelope handed off to
    /// it (locally or via cross-gateway forwarding); `false` if unknown.
    async fn forward_to_mud(
        &self,
        envelope: &Envelope,
        target_mud: &str,
        local: &dyn LocalConnections,
    ) -> Result<bool> {
        if local.is_local(target_mud).await {
            if local.deliver(target_mud, envelope).await {
                return Ok(true);
            }
            // Connection vanished between the check and delivery; fall
            // through and try the shared store in case a sibling picked it
            // up in the meantime, then report unreachable.
        }

        if self.store.sismember(&keys::connected_muds(), target_mud).await? {
            let frame = mudvault_protocol::encode(envelope)?;
            self.store.publish(&keys::route(target_mud), &frame).await?;
            return Ok(true);
        }

        Ok(false)
    }

    async fn dispatch_channel(
        &self,
        envelope: Envelope,
        local: &dyn LocalConnections,
    ) -> Option<Envelope> {
        let Ok(Payload::Channel(payload)) = Payload::parse(MessageType::Channel, &envelope.payload)
        else {
            return Some(self.error_reply(&envelope, ErrorCode::InvalidMessage, None));
        };

        let endpoint = format!(
            "{}:{}",
            envelope.from.mud,
            envelope.from.user.as_deref().unwrap_or("")
        );

        let result = match payload.action {
            ChannelAction::Join => {
                self.channels
                    .join(&payload.channel, &endpoint, &envelope.from.mud)
                    .await
            },
            ChannelAction::Leave => self.channels.leave(&payload.channel, &endpoint).await,
            ChannelAction::Message => {
                let Some(text) = &payload.message else {
                    return Some(self.error_reply(&envelope, ErrorCode::InvalidMessage, None));
                };
                self.channels
                    .post(&payload.channel, &endpoint, &envelope.from.mud, text)
                    .await
            },
            ChannelAction::List => return self.answer_channel_list(&envelope, &payload).await,
        };

        if let Err(e) = result {
            return Some(self.channel_error_reply(&envelope, &e));
        }

        // Join/Leave are membership notices, not just state changes —
        // §4.6 requires existing members to be told, the same as a
        // Message post (ChannelAction::List never reaches here; it
        // returns its answer directly above).
        self.fan_out_channel(&envelope, &payload.channel, local).await;

        None
    }

    async fn answer_channel_list(
        &self,
        envelope: &Envelope,
        payload: &ChannelPayload,
    ) -> Option<Envelope> {
        match self.channels.members(&payload.channel).await {
            Ok(members) => Some(Envelope::new(
                MessageType::Channel,
                Endpoint::mud("gateway"),
                envelope.from.clone(),
                serde_json::to_value(ChannelPayload {
                    channel: payload.channel.clone(),
                    message: Some(members.join(",")),
                    action: ChannelAction::List,
                })
                .unwrap_or(serde_json::Value::Null),
            )),
            Err(e) => Some(self.channel_error_reply(envelope, &e)),
        }
    }

    fn channel_error_reply(
        &self,
        envelope: &Envelope,
        e: &mudvault_channels::ChannelError,
    ) -> Envelope {
        #[cfg(feature = "metrics")]
        counter!(
            routing_metrics::MESSAGES_DROPPED_TOTAL,
            labels::REASON => "channel_moderation"
        )
        .increment(1);
        let code = match e {
            mudvault_channels::ChannelError::Banned
            | mudvault_channels::ChannelError::NotAllowed
            | mudvault_channels::ChannelError::NotMember => ErrorCode::Unauthorized,
            _ => ErrorCode::InternalError,
        };
        self.error_reply(envelope, code, Some(serde_json::json!({ "reason": e.to_string() })))
    }

    /// Resolve `channel`'s membership into distinct MUD names and deliver
    /// the envelope to each once — the same local/remote split unicast
    /// uses (§4.8).
    async fn fan_out_channel(&self, envelope: &Envelope, channel: &str, local: &dyn LocalConnections) {
        let Ok(members) = self.channels.members(channel).await else {
            return;
        };
        let muds: HashSet<&str> = members
            .iter()
            .filter_map(|endpoint| endpoint.split(':').next())
            .filter(|mud| !mud.is_empty())
            .collect();

        for mud in muds {
            if let Err(e) = self.forward_to_mud(envelope, mud, local).await {
                warn!(error = %e, mud, "channel fan-out delivery failed");
            }
        }
    }

    async fn apply_presence(&self, envelope: &Envelope) {
        let Ok(Payload::Presence(payload)) =
            Payload::parse(MessageType::Presence, &envelope.payload)
        else {
            return;
        };
        let Some(user) = &envelope.from.user else {
            return;
        };
        if let Err(e) = self
            .presence
            .update(
                &envelope.from.mud,
                user,
                payload.status,
                payload.activity,
                payload.location,
            )
            .await
        {
            warn!(error = %e, "presence update failed");
        }
    }

    async fn answer_locate(&self, envelope: &Envelope) -> Option<Envelope> {
        let Ok(Payload::Locate(payload)) = Payload::parse(MessageType::Locate, &envelope.payload)
        else {
            return Some(self.error_reply(envelope, ErrorCode::InvalidMessage, None));
        };
        let locations = self.presence.locate(&payload.user).await.unwrap_or_default();
        Some(Envelope::new(
            MessageType::Locate,
            Endpoint::mud("gateway"),
            envelope.from.clone(),
            serde_json::to_value(mudvault_protocol::payload::LocatePayload {
                user: payload.user,
                request: false,
                locations: Some(locations),
            })
            .unwrap_or(serde_json::Value::Null),
        ))
    }

    async fn answer_mudlist(&self, envelope: &Envelope) -> Option<Envelope> {
        if !is_request(envelope) {
            return None;
        }
        let names = self.store.smembers(&keys::connected_muds()).await.unwrap_or_default();
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let host = self.mud_host(&name).await;
            entries.push(mudvault_protocol::payload::MudListEntry {
                name,
                host,
                online: true,
            });
        }
        Some(Envelope::new(
            MessageType::Mudlist,
            Endpoint::mud("gateway"),
            envelope.from.clone(),
            serde_json::to_value(mudvault_protocol::payload::MudListPayload {
                request: false,
                muds: Some(entries),
            })
            .unwrap_or(serde_json::Value::Null),
        ))
    }

    async fn mud_host(&self, mud: &str) -> Option<String> {
        let json = self.store.get(&keys::mud_info(mud)).await.ok()??;
        serde_json::from_str::<MudInfo>(&json).ok()?.host
    }

    async fn answer_channels(&self, envelope: &Envelope) -> Option<Envelope> {
        if !is_request(envelope) {
            return None;
        }
        let names = self.channels.known_channels().await.unwrap_or_default();
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let description = self.channels.meta(&name).await.ok().and_then(|m| m.description);
            let member_count = self.channels.members(&name).await.map(|m| m.len()).unwrap_or(0);
            entries.push(mudvault_protocol::payload::ChannelDirectoryEntry {
                name,
                description,
                member_count,
            });
        }
        Some(Envelope::new(
            MessageType::Channels,
            Endpoint::mud("gateway"),
            envelope.from.clone(),
            serde_json::to_value(mudvault_protocol::payload::ChannelsPayload {
                request: false,
                channels: Some(entries),
            })
            .unwrap_or(serde_json::Value::Null),
        ))
    }

    fn reply_pong(&self, envelope: &Envelope) -> Envelope {
        let timestamp = Payload::parse(MessageType::Ping, &envelope.payload)
            .ok()
            .and_then(|p| match p {
                Payload::Ping(PingPongPayload { timestamp }) => Some(timestamp),
                _ => None,
            })
            .unwrap_or(0);
        Envelope::new(
            MessageType::Pong,
            Endpoint::mud("gateway"),
            envelope.from.clone(),
            serde_json::to_value(PingPongPayload { timestamp }).unwrap_or(serde_json::Value::Null),
        )
    }

    fn error_reply(
        &self,
        envelope: &Envelope,
        code: ErrorCode,
        details: Option<serde_json::Value>,
    ) -> Envelope {
        #[cfg(feature = "metrics")]
        counter!(
            routing_metrics::MESSAGES_DROPPED_TOTAL,
            labels::ERROR_CODE => code.code().to_string()
        )
        .increment(1);
        let mut payload = ErrorPayload::from_code(code);
        if let Some(details) = details {
            payload = payload.with_details(details);
        }
        Envelope::new(
            MessageType::Error,
            Endpoint::mud("gateway"),
            envelope.from.clone(),
            serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        )
    }
}

fn is_request(envelope: &Envelope) -> bool {
    envelope
        .payload
        .get("request")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

#[cfg(feature = "metrics")]
fn message_type_label(t: MessageType) -> &'static str {
    match t {
        MessageType::Tell => "tell",
        MessageType::Emote => "emote",
        MessageType::Emoteto => "emoteto",
        MessageType::Channel => "channel",
        MessageType::Who => "who",
        MessageType::Finger => "finger",
        MessageType::Locate => "locate",
        MessageType::Presence => "presence",
        MessageType::Auth => "auth",
        MessageType::Ping => "ping",
        MessageType::Pong => "pong",
        MessageType::Error => "error",
        MessageType::Mudlist => "mudlist",
        MessageType::Channels => "channels",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use mudvault_protocol::envelope::Endpoint;
    use mudvault_ratelimit::RateLimitConfig;
    use mudvault_store::memory::InMemoryStore;

    use super::*;

    struct FakeLocal {
        local_muds: Vec<String>,
        delivered: Mutex<Vec<(String, Envelope)>>,
    }

    #[async_trait]
    impl LocalConnections for FakeLocal {
        async fn is_local(&self, mud: &str) -> bool {
            self.local_muds.iter().any(|m| m == mud)
        }

        async fn deliver(&self, mud: &str, envelope: &Envelope) -> bool {
            self.delivered
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((mud.to_string(), envelope.clone()));
            true
        }

        async fn note_pong(&self, _mud: &str, _timestamp: u64) {}
    }

    fn router() -> (Router, Arc<dyn SharedStore>) {
        let store = InMemoryStore::new();
        let router = Router::new(
            store.clone(),
            Arc::new(ChannelService::new(store.clone(), 100, true)),
            Arc::new(PresenceRegistry::new(store.clone())),
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
        );
        (router, store)
    }

    fn tell(from_user: &str, to_mud: &str) -> Envelope {
        Envelope::new(
            MessageType::Tell,
            Endpoint::user("Alpha", from_user),
            Endpoint::mud(to_mud),
            serde_json::json!({"message": "hi"}),
        )
    }

    #[tokio::test]
    async fn unicast_delivers_to_local_connection() {
        let (router, _store) = router();
        let local = FakeLocal {
            local_muds: vec!["Beta".to_string()],
            delivered: Mutex::new(Vec::new()),
        };
        let envelope = tell("ann", "Beta");
        let reply = router.dispatch(envelope, "Alpha", &local).await;
        assert!(reply.is_none());
        assert_eq!(local.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unicast_forwards_remotely_when_mud_is_known_but_not_local() {
        let (router, store) = router();
        store.sadd(&keys::connected_muds(), "Beta").await.unwrap();
        let local = FakeLocal {
            local_muds: vec![],
            delivered: Mutex::new(Vec::new()),
        };
        let envelope = tell("ann", "Beta");
        let reply = router.dispatch(envelope, "Alpha", &local).await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn unicast_to_unknown_mud_replies_mud_not_found() {
        let (router, _store) = router();
        let local = FakeLocal {
            local_muds: vec![],
            delivered: Mutex::new(Vec::new()),
        };
        let envelope = tell("ann", "Ghost");
        let reply = router.dispatch(envelope, "Alpha", &local).await.unwrap();
        assert_eq!(reply.r#type, MessageType::Error);
        let payload: mudvault_protocol::ErrorPayload =
            serde_json::from_value(reply.payload).unwrap();
        assert_eq!(payload.code, ErrorCode::MudNotFound.code());
    }

    #[tokio::test]
    async fn ping_gets_a_matching_pong() {
        let (router, _store) = router();
        let local = FakeLocal {
            local_muds: vec![],
            delivered: Mutex::new(Vec::new()),
        };
        let envelope = Envelope::new(
            MessageType::Ping,
            Endpoint::mud("Alpha"),
            Endpoint::mud("gateway"),
            serde_json::json!({"timestamp": 42}),
        );
        let reply = router.dispatch(envelope, "Alpha", &local).await.unwrap();
        assert_eq!(reply.r#type, MessageType::Pong);
        let payload: PingPongPayload = serde_json::from_value(reply.payload).unwrap();
        assert_eq!(payload.timestamp, 42);
    }

    #[tokio::test]
    async fn expired_envelope_is_dropped_silently() {
        let (router, _store) = router();
        let local = FakeLocal {
            local_muds: vec![],
            delivered: Mutex::new(Vec::new()),
        };
        let mut envelope = tell("ann", "Beta");
        envelope.timestamp = (chrono::Utc::now() - chrono::Duration::seconds(3600)).to_rfc3339();
        envelope.metadata.ttl = 60;
        let reply = router.dispatch(envelope, "Alpha", &local).await;
        assert!(reply.is_none());
        assert!(local.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_message_fans_out_to_members() {
        let (router, _store) = router();
        let local = FakeLocal {
            local_muds: vec!["Alpha".to_string(), "Beta".to_string()],
            delivered: Mutex::new(Vec::new()),
        };

        let join = Envelope::new(
            MessageType::Channel,
            Endpoint::user("Beta", "bob"),
            Endpoint::mud("gateway"),
            serde_json::to_value(ChannelPayload {
                channel: "gossip".to_string(),
                message: None,
                action: ChannelAction::Join,
            })
            .unwrap(),
        );
        router.dispatch(join, "Beta", &local).await;

        let post = Envelope::new(
            MessageType::Channel,
            Endpoint::user("Alpha", "ann"),
            Endpoint::mud("gateway"),
            serde_json::to_value(ChannelPayload {
                channel: "gossip".to_string(),
                message: Some("hello".to_string()),
                action: ChannelAction::Message,
            })
            .unwrap(),
        );
        router.dispatch(post, "Alpha", &local).await;

        let delivered = local.delivered.lock().unwrap();
        assert!(delivered.iter().any(|(mud, _)| mud == "Beta"));
    }

    #[tokio::test]
    async fn channel_leave_notifies_remaining_members() {
        let (router, _store) = router();
        let local = FakeLocal {
            local_muds: vec!["Alpha".to_string(), "Beta".to_string()],
            delivered: Mutex::new(Vec::new()),
        };

        for (mud, user) in [("Alpha", "ann"), ("Beta", "bob")] {
            let join = Envelope::new(
                MessageType::Channel,
                Endpoint::user(mud, user),
                Endpoint::mud("gateway"),
                serde_json::to_value(ChannelPayload {
                    channel: "gossip".to_string(),
                    message: None,
                    action: ChannelAction::Join,
                })
                .unwrap(),
            );
            router.dispatch(join, mud, &local).await;
        }
        local.delivered.lock().unwrap().clear();

        let leave = Envelope::new(
            MessageType::Channel,
            Endpoint::user("Beta", "bob"),
            Endpoint::mud("gateway"),
            serde_json::to_value(ChannelPayload {
                channel: "gossip".to_string(),
                message: None,
                action: ChannelAction::Leave,
            })
            .unwrap(),
        );
        router.dispatch(leave, "Beta", &local).await;

        // Bob left, but Alpha is still a member and must be told.
        let delivered = local.delivered.lock().unwrap();
        assert!(delivered.iter().any(|(mud, _)| mud == "Alpha"));
    }

    #[tokio::test]
    async fn broadcast_tell_reaches_every_connected_mud_but_the_sender() {
        let (router, store) = router();
        store.sadd(&keys::connected_muds(), "Alpha").await.unwrap();
        store.sadd(&keys::connected_muds(), "Beta").await.unwrap();
        store.sadd(&keys::connected_muds(), "Gamma").await.unwrap();
        let local = FakeLocal {
            local_muds: vec!["Alpha".to_string(), "Beta".to_string(), "Gamma".to_string()],
            delivered: Mutex::new(Vec::new()),
        };

        let envelope = Envelope::new(
            MessageType::Tell,
            Endpoint::user("Alpha", "ann"),
            Endpoint::broadcast(),
            serde_json::json!({"message": "hi everyone"}),
        );
        let reply = router.dispatch(envelope, "Alpha", &local).await;
        assert!(reply.is_none());

        let delivered = local.delivered.lock().unwrap();
        let muds: HashSet<&str> = delivered.iter().map(|(mud, _)| mud.as_str()).collect();
        assert_eq!(muds, HashSet::from(["Beta", "Gamma"]));
    }

    #[tokio::test]
    async fn locate_request_answers_from_presence_without_forwarding() {
        let (router, _store) = router();
        router
            .presence
            .update(
                "Beta",
                "bob",
                mudvault_protocol::payload::PresenceStatus::Online,
                None,
                None,
            )
            .await
            .unwrap();
        let local = FakeLocal {
            local_muds: vec![],
            delivered: Mutex::new(Vec::new()),
        };
        let envelope = Envelope::new(
            MessageType::Locate,
            Endpoint::user("Alpha", "ann"),
            Endpoint::broadcast(),
            serde_json::json!({"user": "bob", "request": true}),
        );
        let reply = router.dispatch(envelope, "Alpha", &local).await.unwrap();
        assert_eq!(reply.r#type, MessageType::Locate);
        let payload: mudvault_protocol::payload::LocatePayload =
            serde_json::from_value(reply.payload).unwrap();
        assert_eq!(payload.locations.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mudlist_request_reports_host_from_mud_info() {
        let (router, store) = router();
        store.sadd(&keys::connected_muds(), "Alpha").await.unwrap();
        store
            .set(
                &keys::mud_info("Alpha"),
                &serde_json::to_string(&MudInfo {
                    host: Some("10.0.0.5".to_string()),
                })
                .unwrap(),
                None,
            )
            .await
            .unwrap();
        let local = FakeLocal {
            local_muds: vec![],
            delivered: Mutex::new(Vec::new()),
        };
        let envelope = Envelope::new(
            MessageType::Mudlist,
            Endpoint::user("Alpha", "ann"),
            Endpoint::mud("gateway"),
            serde_json::json!({"request": true}),
        );
        let reply = router.dispatch(envelope, "Alpha", &local).await.unwrap();
        let payload: mudvault_protocol::payload::MudListPayload =
            serde_json::from_value(reply.payload).unwrap();
        let muds = payload.muds.unwrap();
        assert_eq!(muds.len(), 1);
        assert_eq!(muds[0].name, "Alpha");
        assert_eq!(muds[0].host.as_deref(), Some("10.0.0.5"));
        assert!(muds[0].online);
    }

    #[tokio::test]
    async fn channels_request_reports_description_and_member_count() {
        let (router, _store) = router();
        let local = FakeLocal {
            local_muds: vec!["Alpha".to_string()],
            delivered: Mutex::new(Vec::new()),
        };

        router
            .channels
            .set_description("gossip", Some("general chat".to_string()))
            .await
            .unwrap();
        router
            .channels
            .join("gossip", "Alpha:ann", "Alpha")
            .await
            .unwrap();

        let envelope = Envelope::new(
            MessageType::Channels,
            Endpoint::user("Alpha", "ann"),
            Endpoint::mud("gateway"),
            serde_json::json!({"request": true}),
        );
        let reply = router.dispatch(envelope, "Alpha", &local).await.unwrap();
        let payload: mudvault_protocol::payload::ChannelsPayload =
            serde_json::from_value(reply.payload).unwrap();
        let channels = payload.channels.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "gossip");
        assert_eq!(channels[0].description.as_deref(), Some("general chat"));
        assert_eq!(channels[0].member_count, 1);
    }
}
