use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DEFAULT_PRIORITY, DEFAULT_TTL_SECS, PROTOCOL_VERSION};

/// Closed `type` enum (§6.1). `Mudlist`/`Channels` are the directory-query
/// extensions carried over from the original protocol's broader interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Tell,
    Emote,
    Emoteto,
    Channel,
    Who,
    Finger,
    Locate,
    Presence,
    Auth,
    Ping,
    Pong,
    Error,
    Mudlist,
    Channels,
}

/// `{mud, user?, displayName?, channel?}` (§3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    pub mud: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(
        rename = "displayName",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl Endpoint {
    #[must_use]
    pub fn mud(mud: impl Into<String>) -> Self {
        Self {
            mud: mud.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn user(mud: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            mud: mud.into(),
            user: Some(user.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn broadcast() -> Self {
        Self::mud("*")
    }

    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        mudvault_common::names::is_wildcard_mud(&self.mud)
    }
}

/// `{priority, ttl, encoding, language, retry?}` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry: Option<bool>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}
fn default_ttl() -> u32 {
    DEFAULT_TTL_SECS
}
fn default_encoding() -> String {
    "utf-8".to_string()
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            ttl: DEFAULT_TTL_SECS,
            encoding: default_encoding(),
            language: None,
            retry: None,
        }
    }
}

/// The outer wire message (§3). `payload` is kept as a raw JSON object;
/// [`crate::payload::Payload::parse`] turns it into a typed variant keyed by
/// `r#type` during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    pub version: String,
    pub id: String,
    pub timestamp: String,
    pub r#type: MessageType,
    pub from: Endpoint,
    pub to: Endpoint,
    #[serde(default = "serde_json::Value::default")]
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Envelope {
    /// Build a new envelope with a fresh id/timestamp, protocol version `1.0`,
    /// and default metadata — used by the gateway itself when it originates a
    /// message (pong replies, error replies, directory responses).
    #[must_use]
    pub fn new(
        r#type: MessageType,
        from: Endpoint,
        to: Endpoint,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            id: Uuid::new_v4().to_string(),
            timestamp: mudvault_common::time::now_iso8601(),
            r#type,
            from,
            to,
            payload,
            signature: None,
            metadata: Metadata::default(),
        }
    }
}
