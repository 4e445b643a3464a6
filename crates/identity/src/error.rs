//! Identity error types.

use common::Status;
use doc_store::StoreError;
use thiserror::Error;

use crate::TokenError;

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Password hashing error: {0}")]
    Hashing(String),

    #[error("Mail delivery error: {0}")]
    Mail(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for identity results.
pub type Result<T> = std::result::Result<T, IdentityError>;

impl From<IdentityError> for Status {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidArgument(msg) => Status::invalid_argument(msg),
            IdentityError::AlreadyExists(msg) => Status::already_exists(msg),
            IdentityError::Unauthenticated(msg) => Status::unauthenticated(msg),
            IdentityError::NotFound(msg) => Status::not_found(msg),
            IdentityError::Token(TokenError::Cache(cache)) => cache.into(),
            IdentityError::Token(token) if token.is_infrastructure() => {
                tracing::error!(error = %token, "token infrastructure failure");
                Status::internal("internal error")
            }
            IdentityError::Token(_) => Status::unauthenticated("invalid token"),
            IdentityError::Store(store) => store.into(),
            other => {
                tracing::error!(error = %other, "identity internal error");
                Status::internal("internal error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use common::Code;
    use doc_store::CacheError;

    use super::*;

    #[test]
    fn caller_errors_keep_their_message() {
        let status: Status = IdentityError::Unauthenticated("invalid email or password".into()).into();
        assert_eq!(status.code, Code::Unauthenticated);
        assert_eq!(status.message, "invalid email or password");
    }

    #[test]
    fn token_failures_are_unauthenticated() {
        let status: Status = IdentityError::Token(TokenError::Expired).into();
        assert_eq!(status.code, Code::Unauthenticated);
    }

    #[test]
    fn infrastructure_failures_are_internal_and_opaque() {
        let status: Status =
            IdentityError::Token(TokenError::Cache(CacheError::Backend("boom at 10.0.0.7".into()))).into();
        assert_eq!(status.code, Code::Internal);
        assert!(!status.message.contains("10.0.0.7"));

        let status: Status = IdentityError::Hashing("bad cost".into()).into();
        assert_eq!(status.code, Code::Internal);
        assert_eq!(status.message, "internal error");
    }
}
