use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("shared store unavailable: {0}")]
    Store(#[from] mudvault_store::StoreError),

    #[error("malformed credential record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("mud name {0:?} is not registered")]
    UnknownMud(String),

    #[error("api key does not match the registered mud")]
    BadApiKey,

    #[error("bearer token is invalid or expired")]
    BadToken,

    #[error("registration secret did not match")]
    BadRegistrationSecret,

    #[error("mud name {0:?} is already registered")]
    AlreadyRegistered(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
