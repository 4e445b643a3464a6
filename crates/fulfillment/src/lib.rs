//! Fulfillment service: orders, approval, and stock adjustments.
//!
//! [`FulfillmentCoordinator`] owns the order state machine. Approval records
//! one [`StockAdjustment`] per line in an outbox, then decrements stock
//! through an [`InventoryMutator`]. Adjustments whose call did not succeed
//! stay in the outbox until [`FulfillmentCoordinator::retry_pending_adjustments`]
//! drains them.

pub mod coordinator;
pub mod error;
pub mod inventory;
pub mod listener;
pub mod order;
pub mod outbox;

pub use coordinator::{FulfillmentCoordinator, OrderStream};
pub use error::{FulfillmentError, Result};
pub use inventory::{InMemoryInventory, InventoryMutator, StockCall};
pub use listener::ProcessedListener;
pub use order::{LineDelta, NewOrder, NewOrderItem, Order, OrderItem, OrderStatus};
pub use outbox::{AdjustmentStatus, MAX_ATTEMPTS, RetryReport, StockAdjustment};
