//! Order lifecycle coordination.

use chrono::Utc;
use common::{Deadline, Status};
use doc_store::{Collection, DocumentStore, Filter, FindOptions, SortOrder, StoreError, TypedStream, Update};
use event_bus::{EventBus, EventBusExt, topics};
use futures_util::TryStreamExt;

use crate::outbox::{AdjustmentStatus, RetryReport, StockAdjustment};
use crate::{FulfillmentError, InventoryMutator, NewOrder, Order, OrderStatus, Result};

/// A stream of orders read lazily from the store.
pub type OrderStream = TypedStream<Order>;

/// Drives orders through `created → approved | cancelled`.
///
/// Every status change is a conditional update in the store, so concurrent
/// requests for one order cannot both win. Approval decrements stock through
/// an [`InventoryMutator`]; a decrement that does not succeed stays in the
/// stock adjustment outbox instead of failing the approval.
pub struct FulfillmentCoordinator<S, I, B> {
    orders: Collection<S, Order>,
    adjustments: Collection<S, StockAdjustment>,
    inventory: I,
    bus: B,
}

impl<S, I, B> FulfillmentCoordinator<S, I, B>
where
    S: DocumentStore + Clone,
    I: InventoryMutator,
    B: EventBus,
{
    pub fn new(store: S, inventory: I, bus: B) -> Self {
        Self {
            orders: Collection::new(store.clone()),
            adjustments: Collection::new(store),
            inventory,
            bus,
        }
    }

    pub fn adjustments(&self) -> &Collection<S, StockAdjustment> {
        &self.adjustments
    }

    #[tracing::instrument(skip_all, fields(user_id = %order.user_id))]
    pub async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let order = order.into_order(Utc::now())?;
        self.orders.insert(&order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, items = order.items.len(), "order created");

        self.publish(topics::ORDER_CREATED, &order).await;
        Ok(order)
    }

    pub async fn get_order(&self, id: &str) -> Result<Order> {
        let id = required_id(id)?;
        self.orders
            .get(id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound)
    }

    /// Orders in creation order, optionally for one user only.
    pub async fn list_orders(&self, user_id: Option<&str>) -> Result<OrderStream> {
        let mut filter = Filter::new();
        if let Some(user_id) = user_id.map(str::trim).filter(|id| !id.is_empty()) {
            filter = filter.eq("user_id", user_id);
        }
        Ok(self
            .orders
            .find(filter, FindOptions::new().sort_by("created_at", SortOrder::Ascending))
            .await?)
    }

    /// Cancels a created or approved order. Stock is not restored.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, id: &str) -> Result<Order> {
        let id = required_id(id)?;
        let filter =
            Filter::by_id(id).is_in("status", OrderStatus::matching(OrderStatus::can_cancel));
        let update = Update::new()
            .set("status", OrderStatus::Cancelled.as_str())
            .set("updated_at", Utc::now().to_rfc3339());

        if let Some(order) = self.orders.find_one_and_update(&filter, &update).await? {
            metrics::counter!("orders_cancelled_total").increment(1);
            tracing::info!("order cancelled");
            return Ok(order);
        }

        match self.orders.get(id).await? {
            None => Err(FulfillmentError::OrderNotFound),
            Some(order) if order.status == OrderStatus::Cancelled => Ok(order),
            Some(order) => Err(FulfillmentError::InvalidTransition {
                action: "cancelled",
                status: order.status,
            }),
        }
    }

    /// Approves a created order and decrements stock for each line.
    ///
    /// Right after the status change one pending adjustment per line is
    /// written to the outbox. Each decrement is bounded by `deadline` and
    /// clears its row when it succeeds, so a failed decrement, or one never
    /// made because this call was dropped, stays pending for
    /// [`Self::retry_pending_adjustments`]. The order stays approved either way.
    #[tracing::instrument(skip(self, deadline))]
    pub async fn approve_order(&self, id: &str, deadline: Deadline) -> Result<Order> {
        let started = std::time::Instant::now();
        let id = required_id(id)?;

        let filter =
            Filter::by_id(id).is_in("status", OrderStatus::matching(OrderStatus::can_approve));
        let update = Update::new()
            .set("status", OrderStatus::Approved.as_str())
            .set("updated_at", Utc::now().to_rfc3339());

        let Some(order) = self.orders.find_one_and_update(&filter, &update).await? else {
            return match self.orders.get(id).await? {
                None => Err(FulfillmentError::OrderNotFound),
                Some(order) => Err(FulfillmentError::InvalidTransition {
                    action: "approved",
                    status: order.status,
                }),
            };
        };
        metrics::counter!("orders_approved_total").increment(1);

        let mut failed = 0usize;
        for adjustment in self.record_adjustments(&order).await {
            let outcome = self.apply(&adjustment, deadline).await;
            if let Err(status) = &outcome {
                failed += 1;
                metrics::counter!("stock_adjustments_failed_total").increment(1);
                tracing::warn!(
                    product_id = %adjustment.product_id,
                    line = adjustment.line,
                    delta = adjustment.delta,
                    error = %status,
                    "stock adjustment failed, left in outbox"
                );
            }
            if let Err(e) = self.settle(&adjustment, &outcome).await {
                tracing::error!(
                    adjustment_id = %adjustment.id,
                    error = %e,
                    "failed to update stock adjustment"
                );
            }
        }

        self.publish(topics::ORDER_APPROVED, &order).await;

        metrics::histogram!("approve_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(failed_adjustments = failed, "order approved");
        Ok(order)
    }

    /// Re-issues every pending stock adjustment once, oldest first.
    #[tracing::instrument(skip_all)]
    pub async fn retry_pending_adjustments(&self, deadline: Deadline) -> Result<RetryReport> {
        let mut pending = self
            .adjustments
            .find(
                Filter::new().eq("status", AdjustmentStatus::Pending.as_str()),
                FindOptions::new().sort_by("created_at", SortOrder::Ascending),
            )
            .await?;

        let mut report = RetryReport::default();
        while let Some(adjustment) = pending.try_next().await? {
            report.attempted += 1;
            let outcome = self.apply(&adjustment, deadline).await;
            match self.settle(&adjustment, &outcome).await? {
                Settled::Applied => report.applied += 1,
                Settled::Retrying => report.failed += 1,
                Settled::Abandoned => {
                    report.failed += 1;
                    report.abandoned += 1;
                }
            }
        }

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                applied = report.applied,
                failed = report.failed,
                abandoned = report.abandoned,
                "stock adjustment retry finished"
            );
        }
        Ok(report)
    }

    /// Writes one pending adjustment per stock-changing line of `order`.
    ///
    /// A row that cannot be written is logged and still returned, so its
    /// decrement is attempted anyway.
    async fn record_adjustments(&self, order: &Order) -> Vec<StockAdjustment> {
        let order_id = order.id.to_string();
        let mut adjustments = Vec::new();
        for line in order.stock_deltas() {
            let adjustment =
                StockAdjustment::pending(&order_id, line.line, &line.product_id, line.delta);
            match self.adjustments.insert(&adjustment).await {
                Ok(()) | Err(StoreError::AlreadyExists { .. }) => {}
                Err(e) => {
                    tracing::error!(
                        adjustment_id = %adjustment.id,
                        error = %e,
                        "failed to record stock adjustment"
                    );
                }
            }
            adjustments.push(adjustment);
        }
        adjustments
    }

    async fn apply(
        &self,
        adjustment: &StockAdjustment,
        deadline: Deadline,
    ) -> std::result::Result<(), Status> {
        let origin = adjustment.origin();
        deadline
            .run(self.inventory.change_stock(
                &adjustment.product_id,
                adjustment.delta,
                &origin,
                deadline,
            ))
            .await
    }

    /// Deletes the row of an applied adjustment, or records the failure on
    /// a pending one.
    async fn settle(
        &self,
        adjustment: &StockAdjustment,
        outcome: &std::result::Result<(), Status>,
    ) -> Result<Settled> {
        let pending =
            Filter::by_id(&adjustment.id).eq("status", AdjustmentStatus::Pending.as_str());
        let status = match outcome {
            Ok(()) => {
                self.adjustments.delete_one(&pending).await?;
                return Ok(Settled::Applied);
            }
            Err(status) => status,
        };

        let next = AdjustmentStatus::after_failure(status, adjustment.attempts + 1);
        let update = Update::new()
            .inc("attempts", 1)
            .set("last_error", status.to_string())
            .set("status", next.as_str())
            .set("updated_at", Utc::now().to_rfc3339());
        self.adjustments.find_one_and_update(&pending, &update).await?;

        if next == AdjustmentStatus::Failed {
            metrics::counter!("stock_adjustments_abandoned_total").increment(1);
            tracing::error!(
                adjustment_id = %adjustment.id,
                product_id = %adjustment.product_id,
                error = %status,
                "giving up on stock adjustment"
            );
            return Ok(Settled::Abandoned);
        }
        Ok(Settled::Retrying)
    }

    async fn publish(&self, topic: &str, order: &Order) {
        if let Err(e) = self.bus.publish_json(topic, &order.to_event()).await {
            tracing::warn!(order_id = %order.id, topic, error = %e, "failed to publish order event");
        }
    }
}

enum Settled {
    Applied,
    Retrying,
    Abandoned,
}

fn required_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(FulfillmentError::InvalidArgument(
            "order id is required".to_string(),
        ));
    }
    Ok(id)
}
