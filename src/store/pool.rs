//! Bounded SQLite connection pool
//!
//! A semaphore caps concurrent sessions. Callers beyond capacity wait up to the
//! acquire timeout instead of failing fast. Connections are opened lazily and
//! handed out through [`PooledConnection`], which returns them on drop, so a
//! session is released on every exit path.

use crate::metrics;
use crate::{KgraphError, Result};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Maximum number of concurrent sessions
    pub size: usize,

    /// How long a caller may wait for a free session
    pub acquire_timeout: Duration,

    /// SQLite busy timeout for lock contention between sessions
    pub busy_timeout: Duration,
}

impl PoolConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: 50,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

fn lock_idle(idle: &Mutex<Vec<Connection>>) -> MutexGuard<'_, Vec<Connection>> {
    match idle.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Connection pool mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Shared pool of SQLite sessions
pub struct ConnectionPool {
    config: PoolConfig,
    idle: Arc<Mutex<Vec<Connection>>>,
    permits: Arc<Semaphore>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Result<Self> {
        if config.size == 0 {
            return Err(KgraphError::Config(
                "connection pool size must be greater than 0".to_string(),
            ));
        }

        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(
            path = %config.path.display(),
            pool_size = config.size,
            "Graph store connection pool initialized"
        );

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.size)),
            idle: Arc::new(Mutex::new(Vec::with_capacity(config.size))),
            config,
        })
    }

    fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.config.path)?;
        conn.busy_timeout(self.config.busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Check out a session, waiting for capacity if necessary
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let started = Instant::now();
        let permit = match tokio::time::timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(KgraphError::BackendUnavailable(
                    "connection pool is closed".to_string(),
                ))
            }
            Err(_) => {
                tracing::warn!(
                    pool_size = self.config.size,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Connection pool exhausted"
                );
                return Err(KgraphError::BackendUnavailable(format!(
                    "no connection available after {:?}",
                    self.config.acquire_timeout
                )));
            }
        };
        metrics::record_pool_wait(started.elapsed().as_secs_f64());

        let reused = lock_idle(&self.idle).pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                tracing::debug!("Opening new graph store connection");
                self.open_connection()?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            idle: Arc::clone(&self.idle),
            permits: Arc::clone(&self.permits),
            _permit: permit,
        })
    }

    /// Run blocking database work on a pooled session
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.acquire().await?;
        tokio::task::spawn_blocking(move || f(&mut *conn))
            .await
            .map_err(|e| KgraphError::BackendUnavailable(format!("database task failed: {}", e)))?
    }

    /// Stop handing out sessions and drop idle ones
    ///
    /// Sessions still checked out are closed when their guards drop.
    pub fn close(&self) {
        self.permits.close();
        let dropped = {
            let mut idle = lock_idle(&self.idle);
            let n = idle.len();
            idle.clear();
            n
        };
        tracing::info!(closed_connections = dropped, "Graph store connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Sessions that can be checked out without waiting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn size(&self) -> usize {
        self.config.size
    }
}

/// A checked-out session; returns to the pool on drop
pub struct PooledConnection {
    conn: Option<Connection>,
    idle: Arc<Mutex<Vec<Connection>>>,
    permits: Arc<Semaphore>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // A closed pool lets the connection drop instead of parking it
            if !self.permits.is_closed() {
                lock_idle(&self.idle).push(conn);
            }
        }
    }
}
