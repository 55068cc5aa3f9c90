//! In-memory graph store
//!
//! Same merge semantics as the SQLite store, held in ordered maps behind one
//! async lock. Writers take the lock for the whole read-merge-write, so
//! concurrent upserts serialize exactly like the transactional backend.

use super::GraphStore;
use crate::graph::{
    merge_properties, require_id, Label, Node, NodeId, NodeRef, Properties, RelType, Relationship,
};
use crate::{KgraphError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

type NodeKey = (Label, NodeId);
type RelKey = (NodeRef, NodeRef, RelType);

#[derive(Default)]
struct Graph {
    nodes: BTreeMap<NodeKey, Properties>,
    relationships: BTreeMap<RelKey, Properties>,
}

/// Graph store for tests and embedding without a database file
#[derive(Default)]
pub struct MemoryGraphStore {
    graph: RwLock<Graph>,
    closed: AtomicBool,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KgraphError::BackendUnavailable(
                "graph store is closed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_node(&self, label: &Label, properties: Properties) -> Result<Node> {
        self.ensure_open()?;
        let id = require_id(&properties)?;

        let mut graph = self.graph.write().await;
        let entry = graph
            .nodes
            .entry((label.clone(), id))
            .or_insert_with(Properties::new);
        merge_properties(entry, &properties);

        Ok(Node::new(label.clone(), entry.clone()))
    }

    async fn upsert_relationship(
        &self,
        start_label: &Label,
        start_props: &Properties,
        end_label: &Label,
        end_props: &Properties,
        rel_type: &RelType,
        rel_props: Option<Properties>,
    ) -> Result<Relationship> {
        self.ensure_open()?;
        let start = NodeRef::new(start_label.clone(), require_id(start_props)?);
        let end = NodeRef::new(end_label.clone(), require_id(end_props)?);

        let mut graph = self.graph.write().await;
        let missing: Vec<String> = [&start, &end]
            .into_iter()
            .filter(|r| !graph.nodes.contains_key(&(r.label.clone(), r.id.clone())))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(KgraphError::EndpointMissing { missing });
        }

        let entry = graph
            .relationships
            .entry((start.clone(), end.clone(), rel_type.clone()))
            .or_insert_with(Properties::new);
        if let Some(update) = &rel_props {
            merge_properties(entry, update);
        }

        Ok(Relationship {
            start,
            end,
            rel_type: rel_type.clone(),
            properties: entry.clone(),
        })
    }

    async fn get_node(&self, label: &Label, id: &NodeId) -> Result<Option<Node>> {
        self.ensure_open()?;
        let graph = self.graph.read().await;
        Ok(graph
            .nodes
            .get(&(label.clone(), id.clone()))
            .map(|props| Node::new(label.clone(), props.clone())))
    }

    async fn delete_node(&self, label: &Label, id: &NodeId) -> Result<bool> {
        self.ensure_open()?;
        let target = NodeRef::new(label.clone(), id.clone());

        let mut graph = self.graph.write().await;
        if graph.nodes.remove(&(label.clone(), id.clone())).is_none() {
            return Ok(false);
        }
        graph
            .relationships
            .retain(|(start, end, _), _| start != &target && end != &target);

        Ok(true)
    }

    async fn nodes_by_label(&self, label: &Label, limit: usize) -> Result<Vec<Node>> {
        self.ensure_open()?;
        let graph = self.graph.read().await;
        Ok(graph
            .nodes
            .iter()
            .filter(|((l, _), _)| l == label)
            .take(limit)
            .map(|(_, props)| Node::new(label.clone(), props.clone()))
            .collect())
    }

    async fn find_node_by_name(&self, label: &Label, name: &str) -> Result<Option<Node>> {
        self.ensure_open()?;
        let graph = self.graph.read().await;
        Ok(graph
            .nodes
            .iter()
            .filter(|((l, _), _)| l == label)
            .find(|(_, props)| props.get("name").and_then(|v| v.as_str()) == Some(name))
            .map(|(_, props)| Node::new(label.clone(), props.clone())))
    }

    async fn get_relationship(
        &self,
        start: &NodeRef,
        end: &NodeRef,
        rel_type: &RelType,
    ) -> Result<Option<Relationship>> {
        self.ensure_open()?;
        let graph = self.graph.read().await;
        Ok(graph
            .relationships
            .get(&(start.clone(), end.clone(), rel_type.clone()))
            .map(|props| Relationship {
                start: start.clone(),
                end: end.clone(),
                rel_type: rel_type.clone(),
                properties: props.clone(),
            }))
    }

    async fn count_nodes(&self, label: &Label) -> Result<usize> {
        self.ensure_open()?;
        let graph = self.graph.read().await;
        Ok(graph.nodes.keys().filter(|(l, _)| l == label).count())
    }

    async fn count_relationships(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.graph.read().await.relationships.len())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
