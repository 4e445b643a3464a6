//! Catalog error types.

use common::Status;
use doc_store::StoreError;
use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    /// Rejected by the authorization delegate, or its resolver failed.
    #[error("{0}")]
    Denied(Status),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub(crate) fn product_not_found() -> Self {
        CatalogError::NotFound("product not found".to_string())
    }
}

impl From<CatalogError> for Status {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidArgument(msg) => Status::invalid_argument(msg),
            CatalogError::NotFound(msg) => Status::not_found(msg),
            CatalogError::Denied(status) => status,
            CatalogError::Store(store) => store.into(),
            other => {
                tracing::error!(error = %other, "catalog internal error");
                Status::internal("internal error")
            }
        }
    }
}
