//! Catalog-side consumer of `order.created`.

use std::sync::Arc;

use doc_store::{Collection, DocumentStore};
use event_bus::{BusError, EventBus, EventBusExt, Message, OrderEvent, ProcessedEvent, topics};
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::Product;

/// Acknowledges newly created orders.
///
/// Handling is advisory: it reads the referenced products and warns about
/// missing ones or short stock, but never changes stock. Decrements happen
/// when the order is approved.
pub struct FulfillmentListener<S, B> {
    products: Collection<S, Product>,
    bus: B,
}

impl<S, B> FulfillmentListener<S, B>
where
    S: DocumentStore + 'static,
    B: EventBus + 'static,
{
    pub fn new(store: S, bus: B) -> Self {
        Self {
            products: Collection::new(store),
            bus,
        }
    }

    /// Subscribes, then handles each message on its own task.
    ///
    /// The subscription is live when this returns, so orders created
    /// afterwards are seen.
    pub async fn start(self) -> Result<JoinHandle<()>, BusError> {
        let mut subscription = self.bus.subscribe(topics::ORDER_CREATED).await?;
        let listener = Arc::new(self);

        Ok(tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                let listener = Arc::clone(&listener);
                tokio::spawn(async move { listener.handle(message).await });
            }
            tracing::info!(topic = topics::ORDER_CREATED, "subscription closed");
        }))
    }

    #[tracing::instrument(skip_all, fields(topic = %message.topic))]
    pub async fn handle(&self, message: Message) {
        let event: OrderEvent = match message.decode() {
            Ok(event) => event,
            Err(e) => {
                metrics::counter!("events_malformed_total", "topic" => topics::ORDER_CREATED)
                    .increment(1);
                tracing::warn!(error = %e, "dropping malformed order.created payload");
                return;
            }
        };

        for item in &event.items {
            match self.products.get(&item.product_id).await {
                Ok(Some(product)) if product.quantity < i64::from(item.quantity) => {
                    tracing::warn!(
                        order_id = %event.order_id,
                        product_id = %item.product_id,
                        requested = item.quantity,
                        available = product.quantity,
                        "insufficient stock for order"
                    );
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(
                        order_id = %event.order_id,
                        product_id = %item.product_id,
                        "order references unknown product"
                    );
                }
                Err(e) => {
                    tracing::warn!(product_id = %item.product_id, error = %e, "product lookup failed");
                }
            }
        }

        let notice = ProcessedEvent::processed(&event.order_id, "Order processed by catalog service");
        if let Err(e) = self.bus.publish_json(topics::ORDER_PROCESSED, &notice).await {
            tracing::warn!(order_id = %event.order_id, error = %e, "failed to publish order.processed");
        }
    }
}
