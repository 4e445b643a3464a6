//! Payloads exchanged between the fulfillment and catalog services.

use common::Money;
use serde::{Deserialize, Serialize};

/// Topic names.
pub mod topics {
    /// An order was persisted in `created` state.
    pub const ORDER_CREATED: &str = "order.created";
    /// An order moved to `approved`.
    pub const ORDER_APPROVED: &str = "order.approved";
    /// The catalog side finished handling an order.
    pub const ORDER_PROCESSED: &str = "order.processed";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEventItem {
    pub product_id: String,
    pub quantity: i32,
}

/// Snapshot of an order carried by `order.created` and `order.approved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: String,
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<OrderEventItem>,
    pub total: Money,
    #[serde(default)]
    pub address: String,
    pub status: String,
}

/// Notice published on `order.processed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub order_id: String,
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl ProcessedEvent {
    pub fn processed(order_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            status: "processed".to_string(),
            message: message.into(),
        }
    }
}
