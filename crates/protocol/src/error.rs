//! Wire-stable error codes (§6.2) and the internal validation error type
//! used while decoding/validating an envelope.

use serde::{Deserialize, Serialize};

/// Wire-stable numeric error codes, sent back to peers inside an `error`
/// envelope's payload (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    InvalidMessage = 1000,
    AuthenticationFailed = 1001,
    Unauthorized = 1002,
    MudNotFound = 1003,
    UserNotFound = 1004,
    ChannelNotFound = 1005,
    RateLimited = 1006,
    InternalError = 1007,
    ProtocolError = 1008,
    UnsupportedVersion = 1009,
    MessageTooLarge = 1010,
}

impl ErrorCode {
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidMessage => "invalid message",
            Self::AuthenticationFailed => "authentication failed",
            Self::Unauthorized => "unauthorized",
            Self::MudNotFound => "mud not found",
            Self::UserNotFound => "user not found",
            Self::ChannelNotFound => "channel not found",
            Self::RateLimited => "rate limited",
            Self::InternalError => "internal error",
            Self::ProtocolError => "protocol error",
            Self::UnsupportedVersion => "unsupported protocol version",
            Self::MessageTooLarge => "message too large",
        }
    }
}

/// Reasons [`crate::validate::validate`] can reject an envelope. Every
/// variant maps to a wire [`ErrorCode`] via [`ValidationError::code`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported protocol version {0:?}")]
    UnsupportedVersion(String),
    #[error("invalid envelope: {0}")]
    MalformedEnvelope(String),
    #[error("invalid payload for {0:?}: {1}")]
    MalformedPayload(crate::envelope::MessageType, String),
    #[error("message exceeds size bound: {0}")]
    TooLarge(String),
}

impl ValidationError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion(_) => ErrorCode::UnsupportedVersion,
            Self::MalformedEnvelope(_) | Self::MalformedPayload(..) => ErrorCode::InvalidMessage,
            Self::TooLarge(_) => ErrorCode::MessageTooLarge,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
