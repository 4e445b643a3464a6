//! Inventory mutation capability and an in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Deadline, OrderLine, Status};
use tokio::sync::RwLock;

/// Applies stock changes on behalf of an order line.
///
/// Implementations must apply a change for a given [`OrderLine::marker`] and
/// product at most once, so a retried call after an ambiguous failure does
/// not decrement twice.
#[async_trait]
pub trait InventoryMutator: Send + Sync {
    async fn change_stock(
        &self,
        product_id: &str,
        delta: i64,
        origin: &OrderLine,
        deadline: Deadline,
    ) -> Result<(), Status>;
}

#[async_trait]
impl<T: InventoryMutator + ?Sized> InventoryMutator for Arc<T> {
    async fn change_stock(
        &self,
        product_id: &str,
        delta: i64,
        origin: &OrderLine,
        deadline: Deadline,
    ) -> Result<(), Status> {
        (**self).change_stock(product_id, delta, origin, deadline).await
    }
}

/// One recorded `change_stock` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockCall {
    pub product_id: String,
    pub delta: i64,
    pub origin: OrderLine,
}

#[derive(Debug, Default)]
struct InventoryState {
    stock: HashMap<String, i64>,
    applied: HashSet<(String, String)>,
    failing: HashSet<String>,
    fail_all: Option<Status>,
    delay: Option<Duration>,
    calls: Vec<StockCall>,
}

/// In-memory inventory for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<RwLock<InventoryState>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_stock(self, product_id: &str, quantity: i64) -> Self {
        self.state
            .write()
            .await
            .stock
            .insert(product_id.to_string(), quantity);
        self
    }

    pub async fn stock(&self, product_id: &str) -> Option<i64> {
        self.state.read().await.stock.get(product_id).copied()
    }

    /// Makes changes to `product_id` fail with `UNAVAILABLE`.
    pub async fn set_fail_on(&self, product_id: &str, fail: bool) {
        let mut state = self.state.write().await;
        if fail {
            state.failing.insert(product_id.to_string());
        } else {
            state.failing.remove(product_id);
        }
    }

    /// Makes every change fail with `status`, or succeed again when `None`.
    pub async fn set_fail_all(&self, status: Option<Status>) {
        self.state.write().await.fail_all = status;
    }

    /// Delays every change, to exercise deadlines.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    pub async fn calls(&self) -> Vec<StockCall> {
        self.state.read().await.calls.clone()
    }
}

#[async_trait]
impl InventoryMutator for InMemoryInventory {
    async fn change_stock(
        &self,
        product_id: &str,
        delta: i64,
        origin: &OrderLine,
        deadline: Deadline,
    ) -> Result<(), Status> {
        let delay = self.state.read().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if deadline.is_expired() {
            return Err(Status::deadline_exceeded("deadline exceeded"));
        }

        let mut state = self.state.write().await;
        state.calls.push(StockCall {
            product_id: product_id.to_string(),
            delta,
            origin: origin.clone(),
        });

        if let Some(status) = &state.fail_all {
            return Err(status.clone());
        }
        if state.failing.contains(product_id) {
            return Err(Status::unavailable("catalog unavailable"));
        }
        if !state.stock.contains_key(product_id) {
            return Err(Status::not_found("product not found"));
        }
        if !state
            .applied
            .insert((origin.marker(), product_id.to_string()))
        {
            return Ok(());
        }
        if let Some(quantity) = state.stock.get_mut(product_id) {
            *quantity += delta;
        }
        Ok(())
    }
}
