//! Side-cache facade
//!
//! Wraps a [`CacheStore`] so that cache trouble can only cost latency: every
//! backend error or timeout is logged, counted, and degraded to a miss.

use super::{CacheKey, CacheStore};
use crate::metrics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Infallible cache used by the query service
#[derive(Clone)]
pub struct SideCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    timeout: Duration,
    namespace: Option<String>,
}

impl SideCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout: Duration::from_millis(250),
            namespace: None,
        }
    }

    /// Bound every cache call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Prefix every stored key with `"{namespace}:"`
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The key as it is stored in the backend
    pub fn storage_key(&self, key: &CacheKey) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, key),
            None => key.to_string(),
        }
    }

    /// Run a backend call under the timeout, absorbing any failure
    async fn guarded<T, F>(&self, action: &'static str, key: &str, fut: F) -> Option<T>
    where
        F: Future<Output = crate::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(action, key, error = %e, "Cache unavailable, continuing without it");
                metrics::record_cache_error();
                None
            }
            Err(_) => {
                warn!(action, key, timeout_ms = self.timeout.as_millis() as u64, "Cache timed out, continuing without it");
                metrics::record_cache_error();
                None
            }
        }
    }

    /// Raw lookup; `None` on miss or on any backend failure
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        let key = self.storage_key(key);
        match self.guarded("get", &key, self.store.get(&key)).await.flatten() {
            Some(value) => {
                debug!(key = %key, "Cache hit");
                metrics::record_cache_hit();
                Some(value)
            }
            None => {
                debug!(key = %key, "Cache miss");
                metrics::record_cache_miss();
                None
            }
        }
    }

    /// Store a raw value with the configured TTL
    pub async fn set(&self, key: &CacheKey, value: &str) {
        let key = self.storage_key(key);
        if self
            .guarded("set", &key, self.store.set(&key, value, self.ttl))
            .await
            .is_some()
        {
            metrics::record_cache_set();
        }
    }

    /// Remove an entry
    pub async fn delete(&self, key: &CacheKey) {
        let key = self.storage_key(key);
        if self
            .guarded("delete", &key, self.store.delete(&key))
            .await
            .is_some()
        {
            debug!(key = %key, "Cache entry invalidated");
            metrics::record_cache_delete();
        }
    }

    /// Typed lookup; an undecodable payload is dropped and treated as a miss
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    /// Typed store using the JSON wire format
    pub async fn set_json<T: Serialize>(&self, key: &CacheKey, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw).await,
            Err(e) => warn!(key = %key, error = %e, "Failed to serialize cache payload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStats, MemoryCache};
    use crate::graph::{Label, NodeId};
    use crate::{KgraphError, Result};
    use async_trait::async_trait;

    /// Backend that fails every call
    struct BrokenCache;

    #[async_trait]
    impl CacheStore for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(KgraphError::Cache("connection refused".to_string()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(KgraphError::Cache("connection refused".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(KgraphError::Cache("connection refused".to_string()))
        }
        async fn clear(&self) -> Result<()> {
            Err(KgraphError::Cache("connection refused".to_string()))
        }
        async fn stats(&self) -> Result<CacheStats> {
            Err(KgraphError::Cache("connection refused".to_string()))
        }
    }

    /// Backend that never answers
    struct HangingCache;

    #[async_trait]
    impl CacheStore for HangingCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            std::future::pending().await
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            std::future::pending().await
        }
        async fn clear(&self) -> Result<()> {
            std::future::pending().await
        }
        async fn stats(&self) -> Result<CacheStats> {
            std::future::pending().await
        }
    }

    fn key() -> CacheKey {
        CacheKey::node(&Label::new("Person").unwrap(), &NodeId::new("p1").unwrap())
    }

    #[tokio::test]
    async fn test_roundtrip_json() {
        let cache = SideCache::new(Arc::new(MemoryCache::default()), Duration::from_secs(60));
        cache.set_json(&key(), &vec![1, 2, 3]).await;
        assert_eq!(cache.get_json::<Vec<i32>>(&key()).await, Some(vec![1, 2, 3]));

        cache.delete(&key()).await;
        assert_eq!(cache.get(&key()).await, None);
    }

    #[tokio::test]
    async fn test_namespace_prefix() {
        let store = Arc::new(MemoryCache::default());
        let cache = SideCache::new(store.clone(), Duration::from_secs(60)).with_namespace("kg");

        assert_eq!(cache.storage_key(&key()), "kg:Person:p1");
        cache.set(&key(), "x").await;
        assert_eq!(store.get("kg:Person:p1").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_broken_backend_degrades_to_miss() {
        let cache = SideCache::new(Arc::new(BrokenCache), Duration::from_secs(60));
        cache.set(&key(), "x").await;
        assert_eq!(cache.get(&key()).await, None);
        cache.delete(&key()).await;
    }

    #[tokio::test]
    async fn test_hanging_backend_times_out() {
        let cache = SideCache::new(Arc::new(HangingCache), Duration::from_secs(60))
            .with_timeout(Duration::from_millis(20));

        let started = std::time::Instant::now();
        assert_eq!(cache.get(&key()).await, None);
        cache.set(&key(), "x").await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_dropped() {
        let store = Arc::new(MemoryCache::default());
        let cache = SideCache::new(store.clone(), Duration::from_secs(60));
        cache.set(&key(), "not json").await;

        assert_eq!(cache.get_json::<Vec<i32>>(&key()).await, None);
        assert_eq!(store.get("Person:p1").await.unwrap(), None);
    }
}
