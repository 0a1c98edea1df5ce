#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("shared store unavailable: {0}")]
    Store(#[from] mudvault_store::StoreError),

    #[error("channel service error: {0}")]
    Channel(#[from] mudvault_channels::ChannelError),

    #[error("presence service error: {0}")]
    Presence(#[from] mudvault_presence::PresenceError),

    #[error("envelope codec error: {0}")]
    Codec(#[from] mudvault_protocol::error::CodecError),

    #[error("malformed routing payload: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RoutingError>;
