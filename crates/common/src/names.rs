//! Name validation and normalization shared by every envelope field that
//! carries a MUD, user, or channel identifier (§3 Data Model — Invariants).

use once_cell::sync::Lazy;
use regex::Regex;

/// `[A-Za-z0-9_-]{3,32}`
static MUD_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z0-9_-]{3,32}$").unwrap()
});

/// `[A-Za-z0-9_-]{1,32}`, shared by user and channel names.
static SHORT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z0-9_-]{1,32}$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Mud,
    User,
    Channel,
}

impl NameKind {
    fn pattern(self) -> &'static Regex {
        match self {
            Self::Mud => &MUD_NAME_RE,
            Self::User | Self::Channel => &SHORT_NAME_RE,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Mud => "mud name",
            Self::User => "user name",
            Self::Channel => "channel name",
        }
    }
}

/// Collapse runs of whitespace to a single `_` and drop any character the
/// target pattern doesn't allow, before validating. The normalizer exists so
/// that `"Bob the Builder"` becomes `"Bob_the_Builder"` rather than being
/// rejected outright — §3 calls this out explicitly for MUD names.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push('_');
            }
            last_was_space = true;
            continue;
        }
        last_was_space = false;
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            out.push(ch);
        }
    }
    out
}

/// Normalize then validate `raw` against `kind`'s pattern. Returns the
/// normalized name on success.
pub fn normalize_and_validate(raw: &str, kind: NameKind) -> Result<String, String> {
    let normalized = normalize(raw);
    if kind.pattern().is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(format!(
            "invalid {}: {raw:?} (normalized: {normalized:?})",
            kind.label()
        ))
    }
}

/// Validate without normalizing — used once a name is already known-clean
/// (e.g. re-checking a value pulled back out of the shared store).
#[must_use]
pub fn is_valid(name: &str, kind: NameKind) -> bool {
    kind.pattern().is_match(name)
}

/// `true` if `mud` is the broadcast wildcard destination.
#[must_use]
pub fn is_wildcard_mud(mud: &str) -> bool {
    mud == "*"
}
