//! SQLite cache implementation

use super::{CacheStats, CacheStore};
use crate::{KgraphError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct SqliteCacheConfig {
    /// Path to SQLite database file
    pub path: PathBuf,

    /// Enable WAL mode for better concurrency
    pub wal_mode: bool,
}

impl Default for SqliteCacheConfig {
    fn default() -> Self {
        // Always use ~/.config for consistency across platforms (macOS, Linux)
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("kgraph");
        path.push("cache.db");

        Self {
            path,
            wal_mode: true,
        }
    }
}

/// SQLite-backed TTL cache
///
/// Survives process restarts, which keeps warm entries across deploys. Expiry
/// is stored as epoch milliseconds and enforced on every read.
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
    config: SqliteCacheConfig,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match conn.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Cache connection mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl SqliteCache {
    /// Open or create a cache database
    pub fn new(config: SqliteCacheConfig) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %config.path.display(), "Opening cache database");

        let conn = Connection::open(&config.path)?;

        // Enable WAL mode for better concurrency
        if config.wal_mode {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
        }

        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        };

        cache.init_schema()?;

        Ok(cache)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        lock(&self.conn).execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at);
            "#,
        )?;

        Ok(())
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&*lock(&conn)))
            .await
            .map_err(|e| KgraphError::Cache(format!("cache task failed: {}", e)))?
    }

    /// Delete expired rows, returning how many were removed
    pub async fn purge_expired(&self) -> Result<usize> {
        let removed = self
            .with_conn(|conn| {
                Ok(conn.execute(
                    "DELETE FROM cache_entries WHERE expires_at <= ?",
                    params![now_millis()],
                )?)
            })
            .await?;

        tracing::debug!(removed, "Purged expired cache entries");
        Ok(removed)
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.config.path
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM cache_entries WHERE key = ? AND expires_at > ?",
                    params![key, now_millis()],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            let now = now_millis();
            let expires_at = now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
            conn.execute(
                r#"
                INSERT INTO cache_entries (key, value, expires_at, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![key, value, expires_at, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM cache_entries WHERE key = ?", params![key])?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        tracing::info!("Clearing cache");
        self.with_conn(|conn| {
            conn.execute("DELETE FROM cache_entries", [])?;
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> Result<CacheStats> {
        self.with_conn(|conn| {
            let entries: i64 =
                conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
            let expired: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE expires_at <= ?",
                params![now_millis()],
                |row| row.get(0),
            )?;
            Ok(CacheStats {
                entries: entries as usize,
                expired: expired as usize,
            })
        })
        .await
    }
}
