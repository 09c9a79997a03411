use thiserror::Error;

pub type DripResult<T> = Result<T, DripError>;

/// Failures at the persistence boundary (content store / recipient registry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("recipient {0} not found")]
    RecipientNotFound(String),
}

/// Failures at the delivery-channel boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("session disconnected")]
    Disconnected,

    #[error("send rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum DripError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
