//! Core graph data structures
//!
//! Defines Node, Relationship and the validated identifier types.

mod ids;
mod node;

pub use ids::{Label, NodeId, RelType, MAX_IDENTIFIER_LEN};
pub use node::{merge_properties, require_id, Node, NodeRef, Properties, Relationship};
