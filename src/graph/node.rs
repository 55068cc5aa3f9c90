//! Nodes and relationships
//!
//! A node is identified by `(label, id)`; a relationship by
//! `(start node, end node, type)`. Both carry an open property map.

use super::ids::{Label, NodeId, RelType};
use crate::{KgraphError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Open-ended property mapping (keys unique, order irrelevant)
pub type Properties = Map<String, Value>;

/// Extract the mandatory `id` from a property map
///
/// # Errors
/// Returns `InvalidInput` when `id` is missing, not a string, or blank.
pub fn require_id(properties: &Properties) -> Result<NodeId> {
    match properties.get("id") {
        Some(Value::String(id)) => NodeId::new(id.clone()),
        Some(other) => Err(KgraphError::InvalidInput(format!(
            "property `id` must be a string, got {}",
            other
        ))),
        None => Err(KgraphError::InvalidInput(
            "properties must contain an `id`".to_string(),
        )),
    }
}

/// Merge `update` into `base`, overwriting conflicting keys
pub fn merge_properties(base: &mut Properties, update: &Properties) {
    for (key, value) in update {
        base.insert(key.clone(), value.clone());
    }
}

/// A labeled node with its full property set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub label: Label,
    pub properties: Properties,
}

impl Node {
    pub fn new(label: Label, properties: Properties) -> Self {
        Self { label, properties }
    }

    pub fn id(&self) -> Option<&str> {
        self.properties.get("id").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }
}

/// Reference to a node by `(label, id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: Label,
    pub id: NodeId,
}

impl NodeRef {
    pub fn new(label: Label, id: NodeId) -> Self {
        Self { label, id }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.id)
    }
}

/// A typed, directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub start: NodeRef,
    pub end: NodeRef,
    pub rel_type: RelType,
    pub properties: Properties,
}
