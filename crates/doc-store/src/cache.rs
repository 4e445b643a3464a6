//! Expiring key/value cache used for short-lived markers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::CacheError;

/// A cache whose entries disappear once their TTL elapses.
#[async_trait]
pub trait ExpiringCache: Send + Sync {
    /// Stores `value` under `key` for `ttl`. Overwrites any existing entry.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Returns true if `key` is present and has not expired.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}

#[async_trait]
impl<T: ExpiringCache + ?Sized> ExpiringCache for Arc<T> {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        (**self).exists(key).await
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory cache for testing and single-process runs.
///
/// Expired entries are evicted lazily on access. Uses tokio's clock so tests
/// can pause and advance time.
#[derive(Clone, Default)]
pub struct InMemoryExpiringCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryExpiringCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Remaining lifetime of a live entry.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        let left = entry.expires_at.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }

    /// Value of a live entry.
    pub async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("cache is unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExpiringCache for InMemoryExpiringCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check_available()?;
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.check_available()?;
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(false),
                Some(entry) if entry.expires_at > now => return Ok(true),
                Some(_) => {}
            }
        }
        // Expired: evict.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(key);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryExpiringCache::new();
        cache
            .set_with_ttl("blacklist:abc", "1", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.exists("blacklist:abc").await.unwrap());
        assert_eq!(cache.ttl("blacklist:abc").await, Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.exists("blacklist:abc").await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cache.exists("blacklist:abc").await.unwrap());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn missing_keys_do_not_exist() {
        let cache = InMemoryExpiringCache::new();
        assert!(!cache.exists("nope").await.unwrap());
        assert_eq!(cache.ttl("nope").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_value_and_ttl() {
        let cache = InMemoryExpiringCache::new();
        cache.set_with_ttl("k", "a", Duration::from_secs(5)).await.unwrap();
        cache.set_with_ttl("k", "b", Duration::from_secs(50)).await.unwrap();
        assert_eq!(cache.get("k").await.as_deref(), Some("b"));
        assert_eq!(cache.ttl("k").await, Some(Duration::from_secs(50)));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn unavailable_cache_fails_every_call() {
        let cache = InMemoryExpiringCache::new();
        cache.set_unavailable(true);
        assert!(matches!(
            cache.set_with_ttl("k", "1", Duration::from_secs(1)).await,
            Err(CacheError::Unavailable(_))
        ));
        assert!(cache.exists("k").await.is_err());

        cache.set_unavailable(false);
        assert!(!cache.exists("k").await.unwrap());
    }
}
