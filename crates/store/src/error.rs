#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend is unreachable. Callers must handle this per §7: serve
    /// reads from a local cache when possible, buffer writes up to a bounded
    /// queue, and surface `INTERNAL_ERROR` (1007) once that queue is full.
    #[error("shared store unavailable: {0}")]
    Unavailable(String),

    #[error("shared store operation failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
