//! Orders and their state machine.

use chrono::{DateTime, Utc};
use common::{Money, OrderId};
use doc_store::Document;
use event_bus::{OrderEvent, OrderEventItem};
use serde::{Deserialize, Serialize};

use crate::{FulfillmentError, Result};

/// Order status.
///
/// ```text
/// created ──► approved
///    │           │
///    └───────────┴──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Created,
    Approved,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [
        OrderStatus::Created,
        OrderStatus::Approved,
        OrderStatus::Cancelled,
    ];

    /// Wire names of the statuses `allowed` accepts, for conditional updates.
    pub fn matching(allowed: fn(&OrderStatus) -> bool) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|status| allowed(status))
            .map(OrderStatus::as_str)
            .collect()
    }

    pub fn can_approve(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::Approved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Approved => "approved",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub total: Money,
    #[serde(default)]
    pub address: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The stock change one order line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDelta {
    pub line: u32,
    pub product_id: String,
    pub delta: i64,
}

impl Document for Order {
    const COLLECTION: &'static str = "orders";

    fn id(&self) -> String {
        self.id.to_string()
    }
}

impl Order {
    /// Stock changes approval applies: one negative delta per line.
    ///
    /// Lines with an empty product id or a non-positive quantity are
    /// skipped. Each kept line carries its index in `items`, which keys its
    /// change in the catalog.
    pub fn stock_deltas(&self) -> Vec<LineDelta> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let product_id = item.product_id.trim();
                if product_id.is_empty() || item.quantity <= 0 {
                    return None;
                }
                Some(LineDelta {
                    line: u32::try_from(index).ok()?,
                    product_id: product_id.to_string(),
                    delta: -i64::from(item.quantity),
                })
            })
            .collect()
    }

    pub fn to_event(&self) -> OrderEvent {
        OrderEvent {
            order_id: self.id.to_string(),
            user_id: self.user_id.clone(),
            items: self
                .items
                .iter()
                .map(|item| OrderEventItem {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                })
                .collect(),
            total: self.total,
            address: self.address.clone(),
            status: self.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: String,
    pub quantity: i64,
}

/// Input for creating an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<NewOrderItem>,
    pub total: Money,
    #[serde(default)]
    pub address: String,
}

impl NewOrder {
    pub(crate) fn into_order(self, now: DateTime<Utc>) -> Result<Order> {
        let user_id = self.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(FulfillmentError::InvalidArgument(
                "user id is required".to_string(),
            ));
        }
        if self.total.is_negative() {
            return Err(FulfillmentError::InvalidArgument(
                "total must not be negative".to_string(),
            ));
        }

        let items = self
            .items
            .into_iter()
            .map(|item| {
                let quantity = i32::try_from(item.quantity).map_err(|_| {
                    FulfillmentError::InvalidArgument(format!(
                        "quantity {} is out of range",
                        item.quantity
                    ))
                })?;
                Ok(OrderItem {
                    product_id: item.product_id,
                    quantity,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Order {
            id: OrderId::new(),
            user_id,
            items,
            total: self.total,
            address: self.address,
            status: OrderStatus::Created,
            created_at: now,
            updated_at: now,
        })
    }
}
