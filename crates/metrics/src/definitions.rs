//! Metric name and label definitions for the gateway.
//!
//! Centralizing these as constants keeps call sites and the Prometheus
//! bucket wiring in `recorder.rs` in sync, and documents what's available.

/// Connection manager metrics (§4.7, §4.9)
pub mod connections {
    /// Currently LIVE + AUTHENTICATING + CONNECTING connections
    pub const ACTIVE: &str = "mudvault_connections_active";
    /// Total connections accepted since start
    pub const ACCEPTED_TOTAL: &str = "mudvault_connections_accepted_total";
    /// Total connections closed, labelled by `reason`
    pub const CLOSED_TOTAL: &str = "mudvault_connections_closed_total";
    /// Heartbeat timeouts that forced a connection to DRAINING
    pub const HEARTBEAT_TIMEOUTS_TOTAL: &str = "mudvault_heartbeat_timeouts_total";
    /// Outbound queue depth per connection at enqueue time
    pub const OUTBOUND_QUEUE_DEPTH: &str = "mudvault_outbound_queue_depth";
    /// Outbound messages dropped because the per-connection queue was full
    pub const OUTBOUND_DROPPED_TOTAL: &str = "mudvault_outbound_dropped_total";
}

/// Envelope and router metrics (§4.1, §4.8)
pub mod routing {
    /// Envelopes routed successfully, labelled by `message_type`
    pub const MESSAGES_ROUTED_TOTAL: &str = "mudvault_messages_routed_total";
    /// Envelopes rejected by validation, labelled by `error_code`
    pub const VALIDATION_ERRORS_TOTAL: &str = "mudvault_validation_errors_total";
    /// Envelopes dropped (TTL expiry, unknown destination, queue pressure),
    /// labelled by `reason`
    pub const MESSAGES_DROPPED_TOTAL: &str = "mudvault_messages_dropped_total";
    /// End-to-end routing duration, receipt to delivery attempt
    pub const DISPATCH_DURATION_SECONDS: &str = "mudvault_dispatch_duration_seconds";
}

/// Authentication service metrics (§4.3)
pub mod auth {
    /// Total authentication attempts
    pub const ATTEMPTS_TOTAL: &str = "mudvault_auth_attempts_total";
    /// Successful authentications
    pub const SUCCESS_TOTAL: &str = "mudvault_auth_success_total";
    /// Failed authentications, labelled by `reason`
    pub const FAILURES_TOTAL: &str = "mudvault_auth_failures_total";
    /// Sessions currently holding a valid bearer token
    pub const ACTIVE_SESSIONS: &str = "mudvault_auth_active_sessions";
}

/// Rate limiter metrics (§4.4)
pub mod ratelimit {
    /// Messages rejected by any of the three scopes
    pub const REJECTIONS_TOTAL: &str = "mudvault_ratelimit_rejections_total";
    /// Peers currently serving a temporary escalation block
    pub const BLOCKED_PEERS: &str = "mudvault_ratelimit_blocked_peers";
    /// Admin-initiated counter resets
    pub const RESETS_TOTAL: &str = "mudvault_ratelimit_resets_total";
}

/// User registry / presence metrics (§4.5)
pub mod presence {
    /// Presence updates received, labelled by `status`
    pub const UPDATES_TOTAL: &str = "mudvault_presence_updates_total";
    /// Locate requests forwarded to remote peers
    pub const LOCATE_REQUESTS_TOTAL: &str = "mudvault_presence_locate_requests_total";
    /// Locate requests that timed out waiting on a remote reply
    pub const LOCATE_TIMEOUTS_TOTAL: &str = "mudvault_presence_locate_timeouts_total";
}

/// Channel service metrics (§4.6)
pub mod channels {
    /// Messages posted to a channel
    pub const POSTS_TOTAL: &str = "mudvault_channel_posts_total";
    /// Join/leave operations, labelled by `action`
    pub const MEMBERSHIP_CHANGES_TOTAL: &str = "mudvault_channel_membership_changes_total";
    /// Currently known channels
    pub const ACTIVE: &str = "mudvault_channels_active";
    /// Posts rejected by a ban or allow-list check
    pub const MODERATION_REJECTIONS_TOTAL: &str = "mudvault_channel_moderation_rejections_total";
}

/// Shared-state adapter metrics (§4.2)
pub mod store {
    /// Store operation duration, labelled by `operation`
    pub const OPERATION_DURATION_SECONDS: &str = "mudvault_store_operation_duration_seconds";
    /// Store operations that failed, labelled by `operation`
    pub const OPERATION_ERRORS_TOTAL: &str = "mudvault_store_operation_errors_total";
    /// Reconciliation events observed (backend connection cycled)
    pub const RECONCILIATIONS_TOTAL: &str = "mudvault_store_reconciliations_total";
}

/// Config loading metrics
pub mod config {
    /// Config load duration in seconds
    pub const LOAD_DURATION_SECONDS: &str = "mudvault_config_load_duration_seconds";
    /// Config parse errors by format
    pub const PARSE_ERRORS_TOTAL: &str = "mudvault_config_parse_errors_total";
    /// Environment substitution failures
    pub const ENV_SUBSTITUTION_FAILURES_TOTAL: &str =
        "mudvault_config_env_substitution_failures_total";
    /// Validation errors by rule type
    pub const VALIDATION_ERRORS_TOTAL: &str = "mudvault_config_validation_errors_total";
}

/// System/runtime metrics
pub mod system {
    /// Process uptime in seconds
    pub const UPTIME_SECONDS: &str = "mudvault_uptime_seconds";
    /// Build information (labels: version, commit, build_date)
    pub const BUILD_INFO: &str = "mudvault_build_info";
}

/// Common label keys used across metrics
pub mod labels {
    pub const MUD: &str = "mud";
    pub const USER: &str = "user";
    pub const CHANNEL: &str = "channel";
    pub const MESSAGE_TYPE: &str = "message_type";
    pub const ERROR_CODE: &str = "error_code";
    pub const REASON: &str = "reason";
    pub const ACTION: &str = "action";
    pub const STATUS: &str = "status";
    pub const OPERATION: &str = "operation";
    pub const SCOPE: &str = "scope";
}

/// Standard histogram buckets for different metric types
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Message dispatch/round-trip duration buckets (in seconds).
    /// Covers 1ms to 10s, since routing is expected to be sub-second.
    pub static DISPATCH_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]
    });

    /// Shared-store operation duration buckets (in seconds).
    /// Covers 100us to 1s.
    pub static STORE_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
        ]
    });

    /// Outbound queue depth buckets.
    pub static QUEUE_DEPTH: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0,
        ]
    });
}
