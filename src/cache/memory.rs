//! In-process cache backend

use super::{CacheStats, CacheStore};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Expiry used when `now + ttl` is not representable
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory TTL cache
///
/// Expired entries are never returned and are purged lazily. When full, expired
/// entries are dropped first, then the entry closest to expiry is evicted.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` keys
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Drop all expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            entries.retain(|_, e| !e.is_expired(now));

            if entries.len() >= self.max_entries {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(victim) = victim {
                    tracing::trace!(key = %victim, "Evicting cache entry");
                    entries.remove(&victim);
                }
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: now.checked_add(ttl).unwrap_or(now + MAX_TTL),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(CacheStats {
            entries: entries.len(),
            expired: entries.values().filter(|e| e.is_expired(now)).count(),
        })
    }
}
