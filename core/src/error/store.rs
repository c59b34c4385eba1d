use thiserror::Error;

/// Errors raised by object store adapters and the chunk stream.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("invalid location: {0}")]
    BadStoreUri(String),

    #[error("bad configuration for store '{store}': {reason}")]
    BadConfiguration { store: String, reason: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
