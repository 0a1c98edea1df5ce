//! Typed payload variants, one per [`crate::envelope::MessageType`] (§6.1).
//!
//! Each struct derives `deny_unknown_fields` so an unexpected field is a
//! validation error rather than a silently-ignored extra, per the strict
//! decode mode §4.1 calls for.

use serde::{Deserialize, Serialize};

use crate::{envelope::MessageType, error::ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TellPayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmotePayload {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelAction {
    Join,
    Leave,
    Message,
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelPayload {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    pub action: ChannelAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhoUser {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<String>,
    pub idle: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub flags: Option<Vec<String>>,
}

/// `who` request or response; exactly one of the two shapes is present on
/// the wire, distinguished by `request`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhoPayload {
    #[serde(default)]
    pub request: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub users: Option<Vec<WhoUser>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FingerPayload {
    pub user: String,
    #[serde(default)]
    pub request: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocateResult {
    pub mud: String,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub area: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocatePayload {
    pub user: String,
    #[serde(default)]
    pub request: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub locations: Option<Vec<LocateResult>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
    Away,
    Busy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresencePayload {
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthPayload {
    #[serde(rename = "mudName")]
    pub mud_name: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PingPongPayload {
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorPayload {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<serde_json::Value>,
}

impl ErrorPayload {
    #[must_use]
    pub fn from_code(code: crate::ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MudListEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub host: Option<String>,
    pub online: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MudListPayload {
    #[serde(default)]
    pub request: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub muds: Option<Vec<MudListEntry>>,
}

/// One entry of a `channels` directory response (§6.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelDirectoryEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(rename = "memberCount")]
    pub member_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelsPayload {
    #[serde(default)]
    pub request: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub channels: Option<Vec<ChannelDirectoryEntry>>,
}

/// The sum type §9's "Dynamic payload typing → tagged variants" design note
/// calls for: one arm per [`MessageType`], each holding its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Tell(TellPayload),
    Emote(EmotePayload),
    Emoteto(EmotePayload),
    Channel(ChannelPayload),
    Who(WhoPayload),
    Finger(FingerPayload),
    Locate(LocatePayload),
    Presence(PresencePayload),
    Auth(AuthPayload),
    Ping(PingPongPayload),
    Pong(PingPongPayload),
    Error(ErrorPayload),
    Mudlist(MudListPayload),
    Channels(ChannelsPayload),
}

impl Payload {
    /// Decode `value` into the payload shape `message_type` requires.
    pub fn parse(
        message_type: MessageType,
        value: &serde_json::Value,
    ) -> Result<Self, ValidationError> {
        let err = |e: serde_json::Error| ValidationError::MalformedPayload(message_type, e.to_string());
        Ok(match message_type {
            MessageType::Tell => {
                Self::Tell(serde_json::from_value(value.clone()).map_err(err)?)
            },
            MessageType::Emote => {
                Self::Emote(serde_json::from_value(value.clone()).map_err(err)?)
            },
            MessageType::Emoteto => {
                Self::Emoteto(serde_json::from_value(value.clone()).map_err(err)?)
            },
            MessageType::Channel => {
                Self::Channel(serde_json::from_value(value.clone()).map_err(err)?)
            },
            MessageType::Who => Self::Who(serde_json::from_value(value.clone()).map_err(err)?),
            MessageType::Finger => {
                Self::Finger(serde_json::from_value(value.clone()).map_err(err)?)
            },
            MessageType::Locate => {
                Self::Locate(serde_json::from_value(value.clone()).map_err(err)?)
            },
            MessageType::Presence => {
                Self::Presence(serde_json::from_value(value.clone()).map_err(err)?)
            },
            MessageType::Auth => Self::Auth(serde_json::from_value(value.clone()).map_err(err)?),
            MessageType::Ping => Self::Ping(serde_json::from_value(value.clone()).map_err(err)?),
            MessageType::Pong => Self::Pong(serde_json::from_value(value.clone()).map_err(err)?),
            MessageType::Error => {
                Self::Error(serde_json::from_value(value.clone()).map_err(err)?)
            },
            MessageType::Mudlist => {
                Self::Mudlist(serde_json::from_value(value.clone()).map_err(err)?)
            },
            MessageType::Channels => {
                Self::Channels(serde_json::from_value(value.clone()).map_err(err)?)
            },
        })
    }

    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        let v = match self {
            Self::Tell(p) => serde_json::to_value(p),
            Self::Emote(p) | Self::Emoteto(p) => serde_json::to_value(p),
            Self::Channel(p) => serde_json::to_value(p),
            Self::Who(p) => serde_json::to_value(p),
            Self::Finger(p) => serde_json::to_value(p),
            Self::Locate(p) => serde_json::to_value(p),
            Self::Presence(p) => serde_json::to_value(p),
            Self::Auth(p) => serde_json::to_value(p),
            Self::Ping(p) | Self::Pong(p) => serde_json::to_value(p),
            Self::Error(p) => serde_json::to_value(p),
            Self::Mudlist(p) => serde_json::to_value(p),
            Self::Channels(p) => serde_json::to_value(p),
        };
        v.unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tell_payload() {
        let v = serde_json::json!({"message": "hi"});
        let p = Payload::parse(MessageType::Tell, &v).unwrap();
        assert_eq!(p, Payload::Tell(TellPayload { message: "hi".into() }));
    }

    #[test]
    fn rejects_unknown_field() {
        let v = serde_json::json!({"message": "hi", "extra": true});
        assert!(Payload::parse(MessageType::Tell, &v).is_err());
    }

    #[test]
    fn rejects_missing_required_field() {
        let v = serde_json::json!({});
        assert!(Payload::parse(MessageType::Tell, &v).is_err());
    }

    #[test]
    fn channels_directory_entry_serializes_member_count_camel_case() {
        let entry = ChannelDirectoryEntry {
            name: "gossip".to_string(),
            description: Some("general chat".to_string()),
            member_count: 3,
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["memberCount"], 3);
        assert_eq!(v["description"], "general chat");
    }

    #[test]
    fn channels_directory_entry_omits_absent_description() {
        let entry = ChannelDirectoryEntry {
            name: "ooc".to_string(),
            description: None,
            member_count: 0,
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert!(v.get("description").is_none());
    }

    #[test]
    fn mudlist_entry_round_trips_with_and_without_host() {
        let with_host = MudListEntry {
            name: "Alpha".to_string(),
            host: Some("10.0.0.1".to_string()),
            online: true,
        };
        let v = serde_json::to_value(&with_host).unwrap();
        assert_eq!(v["host"], "10.0.0.1");

        let without_host = MudListEntry {
            name: "Beta".to_string(),
            host: None,
            online: false,
        };
        let v = serde_json::to_value(&without_host).unwrap();
        assert!(v.get("host").is_none());
    }
}
