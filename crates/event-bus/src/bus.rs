use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

/// A payload received on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Decodes the JSON payload. Unknown fields are ignored.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Stream of messages for one topic. Ends when the transport shuts down.
pub type Subscription = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Core trait for event bus transports.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes `payload` to every current subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Subscribes to `topic`. Only messages published after this returns are
    /// delivered.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;
}

#[async_trait]
impl<T: EventBus + ?Sized> EventBus for Arc<T> {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        (**self).publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        (**self).subscribe(topic).await
    }
}

/// Extension trait providing JSON convenience methods for event buses.
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Serializes `event` as JSON and publishes it.
    async fn publish_json<E: Serialize + Sync>(&self, topic: &str, event: &E) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.publish(topic, payload).await
    }
}

// Blanket implementation for all EventBus implementations
impl<T: EventBus + ?Sized> EventBusExt for T {}
