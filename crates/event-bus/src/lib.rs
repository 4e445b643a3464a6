//! Asynchronous, at-most-once event distribution between services.
//!
//! Publishers hand a topic and an opaque payload to an [`EventBus`];
//! every live subscription to that topic receives a copy. Nothing is
//! persisted: messages published while nobody listens are dropped.

pub mod bus;
pub mod error;
pub mod events;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_pubsub;

pub use bus::{EventBus, EventBusExt, Message, Subscription};
pub use error::{BusError, Result};
pub use events::{OrderEvent, OrderEventItem, ProcessedEvent, topics};
pub use memory::InMemoryEventBus;
#[cfg(feature = "redis")]
pub use redis_pubsub::RedisPubSubEventBus;
