use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("shared store unavailable: {0}")]
    Store(#[from] mudvault_store::StoreError),

    #[error("malformed presence record: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PresenceError>;
