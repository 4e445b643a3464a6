//! Outbox of stock adjustments owed by approved orders.
//!
//! Approval writes one `pending` row per order line before it calls the
//! catalog. A successful call deletes the row; a failed one leaves it for
//! the relay. Rows whose error can never succeed, or that ran out of
//! attempts, become `failed` and are no longer retried.

use chrono::{DateTime, Utc};
use common::{Code, OrderLine, Status};
use doc_store::Document;
use serde::{Deserialize, Serialize};

/// Calls made for one adjustment before it is given up on.
pub const MAX_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentStatus {
    #[default]
    Pending,
    Failed,
}

impl AdjustmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentStatus::Pending => "pending",
            AdjustmentStatus::Failed => "failed",
        }
    }

    /// Status of an adjustment whose `attempts`-th call failed with `status`.
    pub fn after_failure(status: &Status, attempts: u32) -> Self {
        let permanent = matches!(
            status.code,
            Code::InvalidArgument | Code::NotFound | Code::PermissionDenied
        );
        if permanent || attempts >= MAX_ATTEMPTS {
            AdjustmentStatus::Failed
        } else {
            AdjustmentStatus::Pending
        }
    }
}

/// A stock change owed to the catalog for one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub id: String,
    pub order_id: String,
    pub line: u32,
    pub product_id: String,
    pub delta: i64,
    /// Calls made so far.
    pub attempts: u32,
    #[serde(default)]
    pub last_error: String,
    pub status: AdjustmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for StockAdjustment {
    const COLLECTION: &'static str = "stock_adjustments";

    fn id(&self) -> String {
        self.id.clone()
    }
}

impl StockAdjustment {
    pub fn key(order_id: &str, line: u32) -> String {
        OrderLine::item(order_id, line).marker()
    }

    /// A pending adjustment that has not been attempted yet.
    pub fn pending(order_id: &str, line: u32, product_id: &str, delta: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Self::key(order_id, line),
            order_id: order_id.to_string(),
            line,
            product_id: product_id.to_string(),
            delta,
            attempts: 0,
            last_error: String::new(),
            status: AdjustmentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// The order line the catalog keys this change on.
    pub fn origin(&self) -> OrderLine {
        OrderLine::item(&self.order_id, self.line)
    }
}

/// Outcome of one outbox drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub applied: usize,
    pub failed: usize,
    /// Failures that moved the adjustment to `failed`.
    pub abandoned: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_adjustment_is_keyed_by_line() {
        let adj = StockAdjustment::pending("o1", 1, "p1", -2);
        assert_eq!(adj.id, "o1#1");
        assert_eq!(adj.origin(), OrderLine::item("o1", 1));
        assert_eq!(adj.status, AdjustmentStatus::Pending);
        assert_eq!(adj.attempts, 0);
        assert_eq!(serde_json::to_value(&adj).unwrap()["status"], "pending");
    }

    #[test]
    fn permanent_errors_fail_at_once() {
        let missing = Status::not_found("product not found");
        assert_eq!(AdjustmentStatus::after_failure(&missing, 1), AdjustmentStatus::Failed);
        let bad = Status::invalid_argument("quantity change must not be zero");
        assert_eq!(AdjustmentStatus::after_failure(&bad, 1), AdjustmentStatus::Failed);
    }

    #[test]
    fn transient_errors_retry_until_the_cap() {
        let down = Status::unavailable("catalog unavailable");
        assert_eq!(AdjustmentStatus::after_failure(&down, 1), AdjustmentStatus::Pending);
        assert_eq!(
            AdjustmentStatus::after_failure(&down, MAX_ATTEMPTS - 1),
            AdjustmentStatus::Pending
        );
        assert_eq!(
            AdjustmentStatus::after_failure(&down, MAX_ATTEMPTS),
            AdjustmentStatus::Failed
        );
    }
}
