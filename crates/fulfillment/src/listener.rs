//! Fulfillment-side consumer of `order.processed`.

use event_bus::{BusError, EventBus, Message, ProcessedEvent, topics};
use futures_util::StreamExt;
use tokio::task::JoinHandle;

/// Logs processing notices from the catalog. Notices are informational;
/// nothing here changes order state.
pub struct ProcessedListener<B> {
    bus: B,
}

impl<B: EventBus + 'static> ProcessedListener<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub async fn start(self) -> Result<JoinHandle<()>, BusError> {
        let mut subscription = self.bus.subscribe(topics::ORDER_PROCESSED).await?;
        Ok(tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                handle(&message);
            }
            tracing::info!(topic = topics::ORDER_PROCESSED, "subscription closed");
        }))
    }
}

/// Decodes and logs one notice. Malformed payloads are dropped.
pub fn handle(message: &Message) -> Option<ProcessedEvent> {
    match message.decode::<ProcessedEvent>() {
        Ok(notice) => {
            metrics::counter!("orders_processed_notices_total").increment(1);
            tracing::info!(
                order_id = %notice.order_id,
                status = %notice.status,
                message = %notice.message,
                "order processed notice"
            );
            Some(notice)
        }
        Err(e) => {
            metrics::counter!("events_malformed_total", "topic" => topics::ORDER_PROCESSED)
                .increment(1);
            tracing::warn!(error = %e, "dropping malformed order.processed payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use event_bus::{EventBusExt, InMemoryEventBus};

    use super::*;

    #[test]
    fn decodes_notice() {
        let payload = br#"{"order_id":"o1","status":"processed","message":"ok","extra":1}"#;
        let notice = handle(&Message::new(topics::ORDER_PROCESSED, payload.to_vec())).unwrap();
        assert_eq!(notice.order_id, "o1");
        assert_eq!(notice.message, "ok");
    }

    #[test]
    fn drops_malformed_payload() {
        assert!(handle(&Message::new(topics::ORDER_PROCESSED, b"[]".to_vec())).is_none());
    }

    #[tokio::test]
    async fn start_subscribes_before_returning() {
        let bus = InMemoryEventBus::new();
        let handle = ProcessedListener::new(bus.clone()).start().await.unwrap();
        assert_eq!(bus.subscriber_count(topics::ORDER_PROCESSED).await, 1);

        bus.publish_json(topics::ORDER_PROCESSED, &ProcessedEvent::processed("o1", "done"))
            .await
            .unwrap();
        handle.abort();
    }
}
