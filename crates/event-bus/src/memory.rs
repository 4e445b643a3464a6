use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;

use crate::{BusError, EventBus, Message, Result, Subscription};

const DEFAULT_CAPACITY: usize = 1024;

/// In-process event bus built on tokio broadcast channels, one per topic.
///
/// Keeps a log of every published message so tests can assert on traffic
/// even when nobody subscribed.
#[derive(Clone)]
pub struct InMemoryEventBus {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Message>>>>,
    published: Arc<RwLock<Vec<Message>>>,
    fail_on_publish: Arc<AtomicBool>,
    capacity: usize,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus whose per-topic buffers hold `capacity` messages. Slow subscribers
    /// that fall further behind skip the overflow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            published: Arc::new(RwLock::new(Vec::new())),
            fail_on_publish: Arc::new(AtomicBool::new(false)),
            capacity: capacity.max(1),
        }
    }

    /// Configures the bus to reject every publish.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Messages published to `topic` so far, oldest first.
    pub async fn published(&self, topic: &str) -> Vec<Message> {
        self.published
            .read()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of live subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.channels
            .read()
            .await
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(BusError::Transport("bus rejected publish".to_string()));
        }

        let message = Message::new(topic, payload);
        self.published.write().await.push(message.clone());
        metrics::counter!("bus_messages_published_total", "topic" => topic.to_string()).increment(1);

        let channels = self.channels.read().await;
        match channels.get(topic) {
            Some(sender) => {
                if sender.send(message).is_err() {
                    tracing::debug!(topic, "no live subscribers, message dropped");
                }
            }
            None => tracing::debug!(topic, "no subscribers, message dropped"),
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let receiver = {
            let mut channels = self.channels.write().await;
            channels
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let topic = topic.to_string();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let topic = topic.clone();
            async move {
                match item {
                    Ok(message) => Some(message),
                    Err(err) => {
                        tracing::warn!(%topic, error = %err, "subscriber lagged, messages skipped");
                        None
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
