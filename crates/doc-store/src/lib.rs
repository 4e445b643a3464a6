//! Document persistence and expiring key/value storage.
//!
//! [`DocumentStore`] holds JSON documents grouped in named collections and
//! supports the one primitive every service relies on for conflict
//! resolution: an atomic conditional find-and-update. [`ExpiringCache`]
//! holds short-lived markers such as revoked tokens.

pub mod cache;
pub mod collection;
pub mod error;
pub mod filter;
pub mod memory;
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis_cache;
pub mod store;

pub use cache::{ExpiringCache, InMemoryExpiringCache};
pub use collection::{Collection, Document, TypedStream};
pub use error::{CacheError, Result, StoreError};
pub use filter::{Condition, Filter, Update, UpdateOp};
pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
#[cfg(feature = "redis")]
pub use redis_cache::RedisExpiringCache;
pub use store::{DocumentStore, DocumentStream, FindOptions, SortOrder};
