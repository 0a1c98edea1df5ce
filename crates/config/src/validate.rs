//! Configuration validation engine.
//!
//! Validates TOML configuration against the known schema, flags unknown or
//! misspelled keys, and reports semantic warnings (insecure bind + disabled
//! TLS, dangling cert/key paths, timing values that can't satisfy §5's
//! deadlines) as structured diagnostics instead of panicking.

use std::{collections::HashMap, path::Path};

use crate::schema::MudvaultConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "security",
    /// "timing", "file-ref".
    pub category: &'static str,
    /// Dotted path, e.g. "server.bind".
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

/// Expected shape of one level of the configuration schema.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

/// Build the schema tree mirroring every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "server",
            Struct(HashMap::from([
                ("bind", Leaf),
                ("port", Leaf),
                ("auth_deadline_secs", Leaf),
                ("drain_deadline_secs", Leaf),
                ("outbound_queue_capacity", Leaf),
                ("malformed_frame_threshold", Leaf),
                ("malformed_window_secs", Leaf),
                ("duplicate_mud_policy", Leaf),
            ])),
        ),
        (
            "tls",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("cert_path", Leaf),
                ("key_path", Leaf),
            ])),
        ),
        ("store", Struct(HashMap::from([("url", Leaf)]))),
        (
            "auth",
            Struct(HashMap::from([
                ("session_ttl_days", Leaf),
                ("registration_secret", Leaf),
            ])),
        ),
        (
            "heartbeat",
            Struct(HashMap::from([("interval_secs", Leaf)])),
        ),
        (
            "ratelimit",
            Struct(HashMap::from([
                ("per_user_per_minute", Leaf),
                ("per_peer_multiplier", Leaf),
                ("global_per_minute", Leaf),
            ])),
        ),
        (
            "channels",
            Struct(HashMap::from([
                ("history_length", Leaf),
                ("require_join_to_post", Leaf),
            ])),
        ),
        (
            "metrics",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("bind", Leaf),
                ("port", Leaf),
            ])),
        ),
        (
            "logging",
            Struct(HashMap::from([("filter", Leaf), ("json", Leaf)])),
        ),
    ]))
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.len();
    let b_len = b.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Find the best match for `needle` among `candidates` using Levenshtein
/// distance. Returns `Some(best)` if the distance is <= `max_distance`.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = if let Some(p) = path {
        Some(p.to_path_buf())
    } else {
        crate::loader::find_config_file()
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    match std::fs::read_to_string(actual_path) {
        Ok(content) => {
            let mut result = validate_toml_str(&content);
            result.config_path = Some(actual_path.clone());
            check_file_references(&content, &mut result.diagnostics);
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: Some(actual_path.clone()),
        },
    }
}

/// Validate a TOML string without file-system side effects (useful for tests
/// and the gateway's `config validate` CLI subcommand).
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    let schema = build_schema_map();
    check_unknown_fields(&toml_value, &schema, "", &mut diagnostics);

    if let Err(e) = toml::from_str::<MudvaultConfig>(toml_str) {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        });
    } else if let Ok(config) = toml::from_str::<MudvaultConfig>(toml_str) {
        check_semantic_warnings(&config, &mut diagnostics);
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Walk the TOML value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (toml::Value::Table(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
        } else {
            let suggestion = suggest(key, &known_keys, 3);
            let message = suggestion.map_or_else(
                || "unknown field".to_string(),
                |s| format!("unknown field (did you mean \"{s}\"?)"),
            );
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "unknown-field",
                path,
                message,
            });
        }
    }
}

/// Run semantic checks on a successfully parsed config.
fn check_semantic_warnings(config: &MudvaultConfig, diagnostics: &mut Vec<Diagnostic>) {
    let is_localhost = config.server.bind == "127.0.0.1"
        || config.server.bind == "localhost"
        || config.server.bind == "::1";

    if !config.tls.enabled && !is_localhost {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "security",
            path: "tls".into(),
            message: format!("TLS is disabled while binding to {}", config.server.bind),
        });
    }

    let has_cert = config.tls.cert_path.is_some();
    let has_key = config.tls.key_path.is_some();
    if has_cert && !has_key {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "security",
            path: "tls".into(),
            message: "tls.cert_path is set but tls.key_path is missing".into(),
        });
    }
    if has_key && !has_cert {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "security",
            path: "tls".into(),
            message: "tls.key_path is set but tls.cert_path is missing".into(),
        });
    }

    if config.auth.registration_secret.is_none() {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "security",
            path: "auth.registration_secret".into(),
            message: "no registration secret set; MUD registration cannot be admin-gated".into(),
        });
    }

    // §4.7: liveness requires a heartbeat that actually fires more than once
    // before the 2H timeout window closes.
    if config.heartbeat.interval_secs == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "timing",
            path: "heartbeat.interval_secs".into(),
            message: "heartbeat interval must be greater than zero".into(),
        });
    }

    if config.server.drain_deadline_secs == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "timing",
            path: "server.drain_deadline_secs".into(),
            message: "drain deadline of zero gives DRAINING connections no chance to flush"
                .into(),
        });
    }

    if config.channels.history_length == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "unknown-field",
            path: "channels.history_length".into(),
            message: "history_length of zero means channel history is never retained".into(),
        });
    }

    if config.ratelimit.per_user_per_minute == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "unknown-field",
            path: "ratelimit.per_user_per_minute".into(),
            message: "per_user_per_minute of zero blocks every message".into(),
        });
    }

    let store_url = &config.store.url;
    if store_url != "memory" && !store_url.starts_with("redis://") && !store_url.starts_with("rediss://") {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "unknown-field",
            path: "store.url".into(),
            message: format!(
                "store.url {store_url:?} is neither \"memory\" nor a redis:// URL"
            ),
        });
    }

    if config.server.port == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Info,
            category: "security",
            path: "server.port".into(),
            message: "port is 0; a random port will be assigned at startup".into(),
        });
    }
}

/// Check that TLS-referenced file paths exist on disk.
fn check_file_references(toml_str: &str, diagnostics: &mut Vec<Diagnostic>) {
    let Ok(config) = toml::from_str::<MudvaultConfig>(toml_str) else {
        return;
    };

    let file_refs: &[(&str, &Option<String>)] = &[
        ("tls.cert_path", &config.tls.cert_path),
        ("tls.key_path", &config.tls.key_path),
    ];

    for (path_name, value) in file_refs {
        if let Some(file_path) = value {
            if !Path::new(file_path).exists() {
                diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    category: "file-ref",
                    path: (*path_name).into(),
                    message: format!("file not found: {file_path}"),
                });
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn levenshtein_single_edit() {
        assert_eq!(levenshtein("bind", "bnd"), 1);
        assert_eq!(levenshtein("port", "prt"), 1);
    }

    #[test]
    fn suggest_finds_close_match() {
        assert_eq!(suggest("bnd", &["bind", "port"], 3), Some("bind"));
    }

    #[test]
    fn accepts_empty_config() {
        let result = validate_toml_str("");
        assert!(!result.has_errors());
    }

    #[test]
    fn flags_unknown_top_level_field() {
        let result = validate_toml_str("bogus_field = true\n");
        assert!(result.has_errors());
        assert!(result.diagnostics.iter().any(|d| d.category == "unknown-field"));
    }

    #[test]
    fn flags_unknown_field_suggests_correction() {
        let result = validate_toml_str("[server]\nbnd = \"0.0.0.0\"\n");
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.path == "server.bnd")
            .unwrap();
        assert!(diag.message.contains("bind"));
    }

    #[test]
    fn flags_mismatched_tls_cert_and_key() {
        let result = validate_toml_str("[tls]\ncert_path = \"a.pem\"\n");
        assert!(result.has_errors());
    }

    #[test]
    fn flags_non_localhost_without_tls() {
        let result = validate_toml_str("[server]\nbind = \"0.0.0.0\"\n[tls]\nenabled = false\n");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "security" && d.path == "tls")
        );
    }

    #[test]
    fn flags_invalid_store_url() {
        let result = validate_toml_str("[store]\nurl = \"postgres://x\"\n");
        assert!(result.has_errors());
    }

    #[test]
    fn accepts_redis_store_url() {
        let result = validate_toml_str("[store]\nurl = \"redis://localhost:6379\"\n");
        assert!(!result.has_errors());
    }
}
