use std::cmp::Ordering;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use serde_json::Value;

use crate::filter::{compare_values, lookup};
use crate::{Filter, Result, StoreError, Update};

/// A stream of raw documents.
pub type DocumentStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Options for [`DocumentStore::find`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort = Some((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sorts and truncates an already filtered result set in place.
    pub fn apply(&self, docs: &mut Vec<Value>) {
        if let Some((field, order)) = &self.sort {
            docs.sort_by(|a, b| {
                let ord = compare_values(lookup(a, field), lookup(b, field))
                    .unwrap_or(Ordering::Equal);
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
    }
}

/// Core trait for document store implementations.
///
/// Documents are JSON objects with a string `id` field, unique within their
/// collection. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document. Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, collection: &str, document: Value) -> Result<()>;

    /// Returns the first document matching `filter`.
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    /// Streams every matching document, in insertion order unless sorted.
    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        options: FindOptions,
    ) -> Result<DocumentStream>;

    /// Atomically applies `update` to the first document matching `filter`
    /// and returns the document as it is after the update.
    ///
    /// Returns `None` when nothing matches. Concurrent callers racing on the
    /// same document are serialized, so a filter on the current state acts as
    /// a compare-and-set.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Value>>;

    /// Deletes the first matching document. Returns whether one was removed.
    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool>;

    /// Counts matching documents.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn insert(&self, collection: &str, document: Value) -> Result<()> {
        (**self).insert(collection, document).await
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        (**self).find_one(collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        options: FindOptions,
    ) -> Result<DocumentStream> {
        (**self).find(collection, filter, options).await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Value>> {
        (**self)
            .find_one_and_update(collection, filter, update)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool> {
        (**self).delete_one(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        (**self).count(collection, filter).await
    }
}

/// Extracts the string `id` every stored document must carry.
pub(crate) fn document_id(collection: &str, document: &Value) -> Result<String> {
    document
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StoreError::MissingId(collection.to_string()))
}
