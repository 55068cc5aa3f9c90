//! kgraph - Knowledge graph query service with a disposable side-cache
//!
//! kgraph serves single-node lookups over a property graph, accelerated by a
//! short-lived cache, and ingests free text into the graph through idempotent
//! merge upserts.
//!
//! # Architecture
//!
//! - **graph**: Core data structures (Node, Relationship, validated identifiers)
//! - **cache**: TTL side-cache (memory, SQLite) and key derivation
//! - **store**: Graph store adapter with merge semantics and a bounded pool
//! - **service**: Cache-aside query service with call instrumentation
//! - **ingest**: Text -> extraction -> upsert pipeline
//! - **server**: HTTP query endpoint
//! - **config**: YAML configuration with environment overrides

// Core modules
pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod store;

// Components
pub mod app;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod service;

// Re-exports
pub use app::App;
pub use error::{KgraphError, Result};
