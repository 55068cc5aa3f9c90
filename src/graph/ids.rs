//! Type-safe identifiers for labels, relation types and node ids
//!
//! Labels and relation types end up as identifiers in graph statements, so they
//! are validated on construction: a letter or underscore first, then letters,
//! digits or underscores only. Node ids are free-form and always bound as
//! parameters.

use crate::{KgraphError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted label or relation type
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Labels that would collide with cache operation prefixes
const RESERVED_LABELS: &[&str] = &["query_node"];

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    value.chars().count() <= MAX_IDENTIFIER_LEN
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Node label (e.g. "Person", "GPE")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(String);

impl Label {
    /// Create a validated label
    ///
    /// # Errors
    /// Returns `InvalidIdentifier` for empty, over-long, reserved or
    /// non-identifier input.
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        if !is_identifier(&label) || RESERVED_LABELS.contains(&label.as_str()) {
            return Err(KgraphError::InvalidIdentifier {
                kind: "label",
                value: label,
            });
        }
        Ok(Self(label))
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Label {
    type Error = KgraphError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Label {
    type Error = KgraphError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}

/// Relationship type (e.g. "WORKS_AT")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelType(String);

impl RelType {
    /// Create a validated relation type
    pub fn new(rel_type: impl Into<String>) -> Result<Self> {
        let rel_type = rel_type.into();
        if !is_identifier(&rel_type) {
            return Err(KgraphError::InvalidIdentifier {
                kind: "relation type",
                value: rel_type,
            });
        }
        Ok(Self(rel_type))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RelType {
    type Error = KgraphError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RelType {
    type Error = KgraphError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<RelType> for String {
    fn from(rel_type: RelType) -> Self {
        rel_type.0
    }
}

/// Node id, unique within a label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id; only emptiness is rejected
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(KgraphError::InvalidInput(
                "node id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh globally-unique id (UUID v4)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for NodeId {
    type Error = KgraphError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for NodeId {
    type Error = KgraphError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}
