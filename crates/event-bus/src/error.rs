use thiserror::Error;

/// Errors that can occur when publishing or subscribing.
#[derive(Debug, Error)]
pub enum BusError {
    /// The payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport rejected or failed the operation.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
