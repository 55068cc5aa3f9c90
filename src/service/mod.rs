//! Query service
//!
//! Cache-aside reads and cache-maintaining writes over a [`GraphStore`]. The
//! store is authoritative; the cache only ever changes latency:
//!
//! - reads check the cache, fall back to the store on a miss, and populate
//!   the cache when the store has an answer
//! - upserts write the fresh node through and invalidate query keys that may
//!   now be stale
//! - deletes invalidate every key that could still describe the node
//!
//! Every public method runs through [`instrument::instrumented`].

pub mod instrument;

use crate::cache::{CacheKey, SideCache};
use crate::graph::{require_id, Label, Node, NodeId, NodeRef, Properties, RelType, Relationship};
use crate::store::GraphStore;
use crate::Result;
use instrument::instrumented;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Message for a query that found at least one node
pub const MESSAGE_FOUND: &str = "succeed";

/// Message for a query that found nothing
pub const MESSAGE_NOT_FOUND: &str = "no such node";

/// Tunables for the query service
#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Maximum nodes returned by a label-only query
    pub label_scan_limit: usize,

    /// Deadline for each service operation
    pub operation_timeout: Duration,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            label_scan_limit: 100,
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// Envelope returned by the single-node query endpoint
///
/// A query that finds nothing is a successful response with an empty `data`
/// list, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: u16,
    pub message: String,
    pub data: Vec<Properties>,
}

impl QueryResponse {
    pub fn from_data(data: Vec<Properties>) -> Self {
        let message = if data.is_empty() {
            MESSAGE_NOT_FOUND
        } else {
            MESSAGE_FOUND
        };
        Self {
            status: 200,
            message: message.to_string(),
            data,
        }
    }

    pub fn is_found(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Cache-aside query and write service
pub struct QueryService {
    store: Arc<dyn GraphStore>,
    cache: SideCache,
    settings: QuerySettings,
}

impl QueryService {
    pub fn new(store: Arc<dyn GraphStore>, cache: SideCache, settings: QuerySettings) -> Self {
        Self {
            store,
            cache,
            settings,
        }
    }

    /// The authoritative store behind this service
    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn cache(&self) -> &SideCache {
        &self.cache
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Look up one node by `(label, id)`, reading through the node cache
    pub async fn get_node(&self, label: &Label, id: &NodeId) -> Result<Option<Node>> {
        instrumented("get_node", self.settings.operation_timeout, async {
            let key = CacheKey::node(label, id);
            if let Some(properties) = self.cache.get_json::<Properties>(&key).await {
                return Ok(Some(Node::new(label.clone(), properties)));
            }

            let node = self.store.get_node(label, id).await?;
            if let Some(node) = &node {
                self.cache.set_json(&key, &node.properties).await;
            }
            Ok(node)
        })
        .await
    }

    /// Query endpoint lookup
    ///
    /// With an id, returns zero or one node. Without one, returns every node
    /// carrying `label`, ordered by id and capped by the label scan limit.
    /// Empty results are not cached.
    pub async fn query_node(&self, label: &Label, id: Option<&NodeId>) -> Result<QueryResponse> {
        instrumented("query_node", self.settings.operation_timeout, async {
            let key = CacheKey::query_node(label, id);

            let data = match id {
                Some(id) => {
                    if let Some(properties) = self.cache.get_json::<Properties>(&key).await {
                        return Ok(QueryResponse::from_data(vec![properties]));
                    }
                    match self.store.get_node(label, id).await? {
                        Some(node) => {
                            self.cache.set_json(&key, &node.properties).await;
                            vec![node.properties]
                        }
                        None => Vec::new(),
                    }
                }
                None => {
                    if let Some(list) = self.cache.get_json::<Vec<Properties>>(&key).await {
                        return Ok(QueryResponse::from_data(list));
                    }
                    let data: Vec<Properties> = self
                        .store
                        .nodes_by_label(label, self.settings.label_scan_limit)
                        .await?
                        .into_iter()
                        .map(|node| node.properties)
                        .collect();
                    if !data.is_empty() {
                        self.cache.set_json(&key, &data).await;
                    }
                    data
                }
            };

            Ok(QueryResponse::from_data(data))
        })
        .await
    }

    /// Merge a node and refresh the cache around it
    ///
    /// If the store call fails or runs out of time the node key is dropped
    /// rather than left holding the previous payload; the write may still land.
    pub async fn upsert_node(&self, label: &Label, properties: Properties) -> Result<Node> {
        let id = require_id(&properties).ok();

        let result = instrumented("upsert_node", self.settings.operation_timeout, async {
            let node = self.store.upsert_node(label, properties).await?;
            let id = require_id(&node.properties)?;
            self.cache
                .set_json(&CacheKey::node(label, &id), &node.properties)
                .await;
            Ok(node)
        })
        .await;

        if let Some(id) = &id {
            if result.is_err() {
                self.cache.delete(&CacheKey::node(label, id)).await;
            }
            self.invalidate_queries(label, id).await;
        }
        result
    }

    /// Merge a relationship between two existing nodes (not cached)
    pub async fn upsert_relationship(
        &self,
        start_label: &Label,
        start_props: &Properties,
        end_label: &Label,
        end_props: &Properties,
        rel_type: &RelType,
        rel_props: Option<Properties>,
    ) -> Result<Relationship> {
        instrumented(
            "upsert_relationship",
            self.settings.operation_timeout,
            self.store.upsert_relationship(
                start_label,
                start_props,
                end_label,
                end_props,
                rel_type,
                rel_props,
            ),
        )
        .await
    }

    /// Delete a node with its relationships and drop every cache entry for it
    ///
    /// Returns whether a node was deleted; deleting an absent node is a no-op.
    /// Entries are dropped before and after the store call, on every outcome,
    /// since a timed-out delete can still commit.
    pub async fn delete_node(&self, label: &Label, id: &NodeId) -> Result<bool> {
        self.invalidate_node(label, id).await;

        let result = instrumented(
            "delete_node",
            self.settings.operation_timeout,
            self.store.delete_node(label, id),
        )
        .await;

        self.invalidate_node(label, id).await;
        result
    }

    /// First node with the given name (uncached, used for id reconciliation)
    pub async fn find_node_by_name(&self, label: &Label, name: &str) -> Result<Option<Node>> {
        instrumented(
            "find_node_by_name",
            self.settings.operation_timeout,
            self.store.find_node_by_name(label, name),
        )
        .await
    }

    pub async fn get_relationship(
        &self,
        start: &NodeRef,
        end: &NodeRef,
        rel_type: &RelType,
    ) -> Result<Option<Relationship>> {
        instrumented(
            "get_relationship",
            self.settings.operation_timeout,
            self.store.get_relationship(start, end, rel_type),
        )
        .await
    }

    async fn invalidate_queries(&self, label: &Label, id: &NodeId) {
        self.cache
            .delete(&CacheKey::query_node(label, Some(id)))
            .await;
        self.cache.delete(&CacheKey::query_node(label, None)).await;
    }

    async fn invalidate_node(&self, label: &Label, id: &NodeId) {
        self.cache.delete(&CacheKey::node(label, id)).await;
        self.invalidate_queries(label, id).await;
    }
}
