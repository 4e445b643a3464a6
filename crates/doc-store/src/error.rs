use common::Status;
use thiserror::Error;

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A document with the same id already exists in the collection.
    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    /// The document has no string `id` field.
    #[error("Document in collection {0} has no string id")]
    MissingId(String),

    /// An update could not be applied to the stored document.
    #[error("Invalid update on field {field}: {reason}")]
    InvalidUpdate { field: String, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists { .. } => Status::already_exists("resource already exists"),
            other => {
                tracing::error!(error = %other, "document store failure");
                Status::internal("internal error")
            }
        }
    }
}

/// Errors raised by an [`ExpiringCache`](crate::ExpiringCache) backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

impl From<CacheError> for Status {
    fn from(err: CacheError) -> Self {
        tracing::error!(error = %err, "cache failure");
        Status::internal("internal error")
    }
}
