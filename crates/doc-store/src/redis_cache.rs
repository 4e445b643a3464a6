//! Redis-backed expiring cache (optional).
//!
//! Uses the blocking client on tokio's blocking pool; each call opens a
//! connection, which is enough for the revocation marker traffic.

use std::time::Duration;

use async_trait::async_trait;

use crate::{CacheError, ExpiringCache};

#[derive(Debug, Clone)]
pub struct RedisExpiringCache {
    client: redis::Client,
}

impl RedisExpiringCache {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { client })
    }

    async fn run<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = client
                .get_connection()
                .map_err(|e| CacheError::Unavailable(e.to_string()))?;
            op(&mut conn).map_err(|e| CacheError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| CacheError::Backend(e.to_string()))?
    }
}

#[async_trait]
impl ExpiringCache for RedisExpiringCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let key = key.to_string();
        let value = value.to_string();
        // Redis rejects EX 0; round sub-second TTLs up.
        let seconds = ttl.as_secs().max(1);
        self.run(move |conn| {
            redis::cmd("SET")
                .arg(&key)
                .arg(&value)
                .arg("EX")
                .arg(seconds)
                .query::<()>(conn)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let key = key.to_string();
        self.run(move |conn| redis::cmd("EXISTS").arg(&key).query::<bool>(conn))
            .await
    }
}
