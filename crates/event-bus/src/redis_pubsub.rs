//! Redis pub/sub-backed event bus (optional).
//!
//! Redis pub/sub is not durable: messages published while a subscriber is
//! disconnected are lost, which matches the at-most-once contract of the bus.

use std::thread;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{BusError, EventBus, Message, Result, Subscription};

#[derive(Debug, Clone)]
pub struct RedisPubSubEventBus {
    client: redis::Client,
}

impl RedisPubSubEventBus {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BusError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventBus for RedisPubSubEventBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let client = self.client.clone();
        let topic = topic.to_string();

        tokio::task::spawn_blocking(move || {
            let mut conn = client
                .get_connection()
                .map_err(|e| BusError::Transport(e.to_string()))?;
            redis::cmd("PUBLISH")
                .arg(&topic)
                .arg(payload)
                .query::<i64>(&mut conn)
                .map_err(|e| BusError::Transport(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| BusError::Transport(e.to_string()))?
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        let client = self.client.clone();
        let topic = topic.to_string();

        // Background thread that receives pub/sub messages and forwards them.
        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(conn) => conn,
                Err(e) => {
                    let _ = ready_tx.send(Err(BusError::Transport(e.to_string())));
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if let Err(e) = pubsub.subscribe(&topic) {
                let _ = ready_tx.send(Err(BusError::Transport(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            loop {
                let msg = match pubsub.get_message() {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(%topic, error = %e, "redis subscription closed");
                        return;
                    }
                };

                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(_) => continue,
                };

                if tx.send(Message::new(topic.clone(), payload)).is_err() {
                    return;
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| BusError::Transport("subscriber thread exited".to_string()))??;

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
