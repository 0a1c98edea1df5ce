//! Wire envelope, payload variants, codec, and validator for the mesh
//! protocol (spec §3 Data Model, §4.1 Envelope Codec + Validator, §6.1 Wire
//! protocol).
//!
//! Every frame exchanged with a peer is one JSON-encoded [`Envelope`]. The
//! envelope's `type` field selects which [`Payload`] variant its `payload`
//! object must decode into; [`validate::validate`] enforces that shape plus
//! the string-length and name-format invariants from §3.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod validate;

pub use codec::{decode, encode};
pub use envelope::{Endpoint, Envelope, Metadata, MessageType};
pub use error::ErrorCode;
pub use payload::{
    AuthPayload, ChannelAction, ChannelPayload, EmotePayload, ErrorPayload, FingerPayload,
    LocatePayload, LocateResult, MudListEntry, MudListPayload, Payload, PingPongPayload,
    PresencePayload, TellPayload, WhoPayload, WhoUser,
};

/// Only protocol version accepted on the wire (§3).
pub const PROTOCOL_VERSION: &str = "1.0";

/// `tell`/`emote`/`channel` payload `message` bound (§3).
pub const MAX_MESSAGE_CHARS: usize = mudvault_common::sanitize::MAX_MESSAGE_CHARS;

/// `finger`/`who` payload `formatted`/`info` bound (§3).
pub const MAX_FORMATTED_CHARS: usize = mudvault_common::sanitize::MAX_FORMATTED_CHARS;

/// Bounds on `metadata.priority` (§3).
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// Bounds on `metadata.ttl`, in seconds (§3).
pub const MIN_TTL_SECS: u32 = 1;
pub const MAX_TTL_SECS: u32 = 3600;

/// Default TTL applied when `metadata.ttl` is omitted.
pub const DEFAULT_TTL_SECS: u32 = 300;

/// Default priority applied when `metadata.priority` is omitted.
pub const DEFAULT_PRIORITY: u8 = 5;

/// A priority at or above this value makes a dropped, retry-requested
/// message surface an error back to its sender instead of vanishing
/// silently (§4.8, "At-most-once with best-effort retry").
pub const SURFACE_DROP_PRIORITY: u8 = 7;
