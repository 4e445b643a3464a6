//! Fulfillment error types.

use common::Status;
use doc_store::StoreError;
use thiserror::Error;

use crate::OrderStatus;

/// Errors that can occur during fulfillment operations.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("{0}")]
    InvalidArgument(String),

    /// Order not found.
    #[error("order not found")]
    OrderNotFound,

    /// Order is not in a state that allows the transition.
    #[error("order cannot be {action} in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: OrderStatus,
    },

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, FulfillmentError>;

impl From<FulfillmentError> for Status {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::InvalidArgument(msg) => Status::invalid_argument(msg),
            FulfillmentError::OrderNotFound => Status::not_found(err.to_string()),
            FulfillmentError::InvalidTransition { .. } => Status::invalid_argument(err.to_string()),
            FulfillmentError::Store(store) => store.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::Code;

    use super::*;

    #[test]
    fn transition_errors_are_invalid_argument() {
        let status: Status = FulfillmentError::InvalidTransition {
            action: "approved",
            status: OrderStatus::Cancelled,
        }
        .into();
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(status.message, "order cannot be approved in status cancelled");
    }

    #[test]
    fn missing_order_is_not_found() {
        let status: Status = FulfillmentError::OrderNotFound.into();
        assert_eq!(status.code, Code::NotFound);
    }
}
