//! Shared application state handed to every connection and route handler.

use std::sync::Arc;

use mudvault_auth::AuthService;
use mudvault_channels::ChannelService;
use mudvault_config::MudvaultConfig;
use mudvault_presence::PresenceRegistry;
use mudvault_ratelimit::RateLimiter;
use mudvault_routing::Router;
use mudvault_store::SharedStore;

use crate::registry::ConnectionRegistry;

/// Everything a connection task or HTTP route needs, assembled once at
/// startup by [`crate::supervisor::GatewaySupervisor`].
pub struct GatewayState {
    pub config: MudvaultConfig,
    pub store: Arc<dyn SharedStore>,
    pub auth: Arc<AuthService>,
    pub channels: Arc<ChannelService>,
    pub presence: Arc<PresenceRegistry>,
    pub ratelimit: Arc<RateLimiter>,
    pub router: Arc<Router>,
    pub connections: Arc<ConnectionRegistry>,
}

impl GatewayState {
    #[must_use]
    pub fn new(config: MudvaultConfig, store: Arc<dyn SharedStore>) -> Arc<Self> {
        let auth = Arc::new(AuthService::new(
            store.clone(),
            std::time::Duration::from_secs(u64::from(config.auth.session_ttl_days) * 24 * 3600),
            config.auth.registration_secret.clone(),
        ));
        let channels = Arc::new(ChannelService::new(
            store.clone(),
            config.channels.history_length,
            config.channels.require_join_to_post,
        ));
        let presence = Arc::new(PresenceRegistry::new(store.clone()));
        let ratelimit = Arc::new(RateLimiter::new(mudvault_ratelimit::RateLimitConfig {
            per_user_per_minute: config.ratelimit.per_user_per_minute,
            per_peer_multiplier: config.ratelimit.per_peer_multiplier,
            global_per_minute: config.ratelimit.global_per_minute,
            ..mudvault_ratelimit::RateLimitConfig::default()
        }));
        let router = Arc::new(Router::new(
            store.clone(),
            channels.clone(),
            presence.clone(),
            ratelimit.clone(),
        ));
        let connections = Arc::new(ConnectionRegistry::new(config.server.duplicate_mud_policy));

        Arc::new(Self {
            config,
            store,
            auth,
            channels,
            presence,
            ratelimit,
            router,
            connections,
        })
    }
}
