#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("shared store unavailable: {0}")]
    Store(#[from] mudvault_store::StoreError),

    #[error("malformed channel record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("endpoint is banned from this channel")]
    Banned,

    #[error("mud is not on this channel's allow-list")]
    NotAllowed,

    #[error("must join before posting")]
    NotMember,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
