//! Cache layer
//!
//! A disposable key-value side-cache with per-key expiration. The graph store is
//! authoritative: dropping every entry changes latency, never results.
//!
//! - [`CacheStore`]: backend contract (memory or SQLite)
//! - [`CacheKey`]: deterministic key derivation per operation namespace
//! - [`SideCache`]: infallible facade that turns backend failures into misses

mod memory;
mod side;
mod sqlite;

pub use memory::MemoryCache;
pub use side::SideCache;
pub use sqlite::{SqliteCache, SqliteCacheConfig};

use crate::graph::{Label, NodeId};
use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Key-value store with per-key expiration
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live (non-expired) value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, overwriting any existing entry, expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove an entry; no-op when absent
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry
    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<CacheStats>;
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently stored, live or not yet purged
    pub entries: usize,
    /// Entries past their expiry awaiting purge
    pub expired: usize,
}

/// Key namespace; each namespace caches a differently-shaped payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    /// Generic node lookup, payload is one property map
    Node,
    /// Query endpoint lookup, payload is one property map (with id) or a list (label only)
    QueryNode,
}

impl CacheOp {
    fn prefix(self) -> Option<&'static str> {
        match self {
            CacheOp::Node => None,
            CacheOp::QueryNode => Some("query_node"),
        }
    }
}

/// Deterministic cache key derived from `(operation, label, optional id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    op: CacheOp,
    label: Label,
    id: Option<NodeId>,
}

impl CacheKey {
    /// `"{label}:{id}"`
    pub fn node(label: &Label, id: &NodeId) -> Self {
        Self {
            op: CacheOp::Node,
            label: label.clone(),
            id: Some(id.clone()),
        }
    }

    /// `"query_node:{label}:{id}"`, or `"query_node:{label}"` without an id
    pub fn query_node(label: &Label, id: Option<&NodeId>) -> Self {
        Self {
            op: CacheOp::QueryNode,
            label: label.clone(),
            id: id.cloned(),
        }
    }

    pub fn op(&self) -> CacheOp {
        self.op
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = self.op.prefix() {
            write!(f, "{}:", prefix)?;
        }
        write!(f, "{}", self.label)?;
        if let Some(id) = &self.id {
            write!(f, ":{}", id)?;
        }
        Ok(())
    }
}
