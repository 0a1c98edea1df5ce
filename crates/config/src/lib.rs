//! Configuration loading, validation, and `${ENV_VAR}` substitution for the
//! gateway (§9 ambient stack expansion).
//!
//! Config file: `mudvault.toml`, searched in `./` then the OS config
//! directory (`~/.config/mudvault/` on Linux). Supports `${ENV_VAR}`
//! substitution in any string value.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_or_default_config_path, load_config, save_config},
    schema::{
        AuthConfig, ChannelsConfig, DuplicateMudPolicy, HeartbeatConfig, LoggingConfig,
        MetricsConfig, MudvaultConfig, RateLimitConfig, ServerConfig, StoreConfig, TlsConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
