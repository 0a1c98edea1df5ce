#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("shared store unavailable: {0}")]
    Store(#[from] mudvault_store::StoreError),

    #[error("failed to bind listener on {0}: {1}")]
    Bind(std::net::SocketAddr, std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
