//! Config schema: bind address, TLS, the shared-state backend, auth/session
//! timing, rate-limit defaults, and channel history length (§9 ambient
//! stack expansion; values line up with the defaults named throughout §4).

use serde::{Deserialize, Serialize};

/// Root configuration, loaded from `mudvault.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MudvaultConfig {
    pub server: ServerConfig,
    pub tls: TlsConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub heartbeat: HeartbeatConfig,
    pub ratelimit: RateLimitConfig,
    pub channels: ChannelsConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl Default for MudvaultConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tls: TlsConfig::default(),
            store: StoreConfig::default(),
            auth: AuthConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            ratelimit: RateLimitConfig::default(),
            channels: ChannelsConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Listener configuration (§6.1: default port 8081).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Deadline for the CONNECTING→AUTHENTICATING→LIVE handshake (§4.7).
    pub auth_deadline_secs: u64,
    /// Deadline DRAINING is allowed before a force-close (§4.9, §5).
    pub drain_deadline_secs: u64,
    /// Bounded outbound queue capacity per connection (§4.7, §9).
    pub outbound_queue_capacity: usize,
    /// Consecutive malformed frames within `malformed_window_secs` before a
    /// connection is closed (§4.1, §7).
    pub malformed_frame_threshold: u32,
    pub malformed_window_secs: u64,
    /// When a second `auth` arrives for an already-LIVE mud name: refuse the
    /// newcomer (default) or displace the existing connection (§4.3, §9).
    pub duplicate_mud_policy: DuplicateMudPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8081,
            auth_deadline_secs: 10,
            drain_deadline_secs: 5,
            outbound_queue_capacity: 256,
            malformed_frame_threshold: 5,
            malformed_window_secs: 60,
            duplicate_mud_policy: DuplicateMudPolicy::RefuseNew,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateMudPolicy {
    RefuseNew,
    DisplaceOld,
}

/// Optional TLS termination (§6.1: "TLS permitted").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Shared-state adapter backend selection (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `redis://...` to use the Redis backend, or `memory` for the
    /// in-process backend (single-instance deployments and tests).
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "memory".to_string(),
        }
    }
}

/// Auth service timing (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session token lifetime, in days.
    pub session_ttl_days: u32,
    /// Out-of-band shared secret an admin registration call must present.
    pub registration_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_days: 7,
            registration_secret: None,
        }
    }
}

/// Heartbeat timer (§4.7: ping every H, `2H` liveness bound).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

/// Rate-limit defaults (§4.4); mirrors `mudvault_ratelimit::RateLimitConfig`
/// field-for-field so the gateway can build one straight from the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub per_user_per_minute: u32,
    pub per_peer_multiplier: u32,
    pub global_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_user_per_minute: 20,
            per_peer_multiplier: 10,
            global_per_minute: 2000,
        }
    }
}

/// Channel service defaults (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Bounded history ring length `L`.
    pub history_length: usize,
    /// Whether `post` requires prior `join`, or auto-joins the poster.
    pub require_join_to_post: bool,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            history_length: 100,
            require_join_to_post: true,
        }
    }
}

/// `/metrics` export (§4.9, gated behind the `prometheus` cargo feature).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

/// Structured logging (§9 ambient stack).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or
    /// `"mudvault_gateway=debug,info"`.
    pub filter: String,
    /// Emit JSON-formatted log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
