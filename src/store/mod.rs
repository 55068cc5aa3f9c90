//! Graph store adapter
//!
//! The [`GraphStore`] trait is the only write path into the graph. Every
//! implementation gives merge semantics: at most one node per `(label, id)` and
//! at most one relationship per `(start, end, type)`, no matter how often or how
//! concurrently the same upsert runs.
//!
//! - [`SqliteGraphStore`]: authoritative, transactional, pooled
//! - [`MemoryGraphStore`]: substitutable in-process fake

mod memory;
mod pool;
mod sqlite;

pub use memory::MemoryGraphStore;
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use sqlite::SqliteGraphStore;

use crate::graph::{Label, Node, NodeId, NodeRef, Properties, RelType, Relationship};
use crate::Result;
use async_trait::async_trait;

/// Idempotent create/update/delete over a property graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge a node by `(label, properties.id)`
    ///
    /// An existing node gets `properties` merged in (overwriting conflicting
    /// keys); otherwise a node is created with exactly `properties`. Returns the
    /// full resulting property set.
    async fn upsert_node(&self, label: &Label, properties: Properties) -> Result<Node>;

    /// Merge a relationship between two existing nodes
    ///
    /// Both property maps must carry the endpoint `id`. Fails with
    /// `EndpointMissing` (and writes nothing) when either endpoint is absent.
    async fn upsert_relationship(
        &self,
        start_label: &Label,
        start_props: &Properties,
        end_label: &Label,
        end_props: &Properties,
        rel_type: &RelType,
        rel_props: Option<Properties>,
    ) -> Result<Relationship>;

    /// Read a node; `None` when no such `(label, id)` exists
    async fn get_node(&self, label: &Label, id: &NodeId) -> Result<Option<Node>>;

    /// Delete a node and every relationship attached to it
    ///
    /// Returns `false` when the node did not exist.
    async fn delete_node(&self, label: &Label, id: &NodeId) -> Result<bool>;

    /// Nodes carrying `label`, ordered by id, at most `limit`
    async fn nodes_by_label(&self, label: &Label, limit: usize) -> Result<Vec<Node>>;

    /// First node (lowest id) with the given `name` property
    async fn find_node_by_name(&self, label: &Label, name: &str) -> Result<Option<Node>>;

    async fn get_relationship(
        &self,
        start: &NodeRef,
        end: &NodeRef,
        rel_type: &RelType,
    ) -> Result<Option<Relationship>>;

    async fn count_nodes(&self, label: &Label) -> Result<usize>;

    async fn count_relationships(&self) -> Result<usize>;

    /// Release backend resources; later calls fail with `BackendUnavailable`
    async fn close(&self) {}
}
