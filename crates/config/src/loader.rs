//! `mudvault.toml` discovery and loading, with `${ENV_VAR}` substitution
//! (§9 ambient stack expansion: "searched in `./` then the OS config
//! directory").

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::MudvaultConfig};

const CONFIG_FILENAME: &str = "mudvault.toml";

/// Load config from the given path.
pub fn load_config(path: &Path) -> anyhow::Result<MudvaultConfig> {
    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let parsed = toml::from_str(&raw).map_err(|e| {
        #[cfg(feature = "metrics")]
        mudvault_metrics::counter!(mudvault_metrics::config::PARSE_ERRORS_TOTAL).increment(1);
        anyhow::anyhow!(e)
    })?;

    #[cfg(feature = "metrics")]
    mudvault_metrics::histogram!(mudvault_metrics::config::LOAD_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    Ok(parsed)
}

/// Discover and load config from standard locations, falling back to
/// defaults (with a warning logged) if the file is missing or invalid.
#[must_use]
pub fn discover_and_load() -> MudvaultConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    MudvaultConfig::default()
}

/// Find `mudvault.toml` in `./` then the OS config directory.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    if let Some(dir) = config_dir() {
        let p = dir.join(CONFIG_FILENAME);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

/// The OS-standard config directory for `mudvault` (e.g.
/// `~/.config/mudvault/` on Linux).
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "mudvault").map(|d| d.config_dir().to_path_buf())
}

/// Path of an existing config file, or the default path a fresh one would
/// be written to.
#[must_use]
pub fn find_or_default_config_path() -> PathBuf {
    find_config_file().unwrap_or_else(|| {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILENAME)
    })
}

/// Serialize `config` to TOML and write it to the user-global config path,
/// creating parent directories as needed.
pub fn save_config(config: &MudvaultConfig) -> anyhow::Result<PathBuf> {
    let path = find_or_default_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(&path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_substitutes_env_then_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mudvault.toml");
        // SAFETY: test-local env var, no concurrent access in this process.
        unsafe {
            std::env::set_var("MUDVAULT_TEST_PORT", "9999");
        }
        std::fs::write(&path, "[server]\nport = ${MUDVAULT_TEST_PORT}\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 9999);
    }

    #[test]
    fn save_then_find_round_trips() {
        let cfg = MudvaultConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: MudvaultConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.port, cfg.server.port);
    }
}
