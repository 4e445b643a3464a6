//! Typed view over one collection of a [`DocumentStore`].

use std::marker::PhantomData;
use std::pin::Pin;

use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{DocumentStore, Filter, FindOptions, Result, Update};

/// A record stored in its own collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the collection holding this type.
    const COLLECTION: &'static str;

    /// The unique document id.
    fn id(&self) -> String;
}

/// A stream of typed documents.
pub type TypedStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Serializes and deserializes `T` around the raw store operations.
pub struct Collection<S, T> {
    store: S,
    _marker: PhantomData<fn() -> T>,
}

impl<S: Clone, T> Clone for Collection<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S: DocumentStore, T: Document> Collection<S, T> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn insert(&self, document: &T) -> Result<()> {
        let value = serde_json::to_value(document)?;
        self.store.insert(T::COLLECTION, value).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        self.find_one(&Filter::by_id(id)).await
    }

    pub async fn find_one(&self, filter: &Filter) -> Result<Option<T>> {
        self.store
            .find_one(T::COLLECTION, filter)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    pub async fn find(&self, filter: Filter, options: FindOptions) -> Result<TypedStream<T>> {
        let stream = self.store.find(T::COLLECTION, filter, options).await?;
        Ok(Box::pin(stream.map(|item| {
            item.and_then(|value| serde_json::from_value::<T>(value).map_err(Into::into))
        })))
    }

    pub async fn find_one_and_update(&self, filter: &Filter, update: &Update) -> Result<Option<T>> {
        self.store
            .find_one_and_update(T::COLLECTION, filter, update)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    pub async fn delete_one(&self, filter: &Filter) -> Result<bool> {
        self.store.delete_one(T::COLLECTION, filter).await
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64> {
        self.store.count(T::COLLECTION, filter).await
    }
}
