//! Configuration system
//!
//! Loads ~/.config/kgraph/config.yaml with support for:
//! - Graph store location and connection pool sizing
//! - Cache backend, TTL and namespace
//! - Ingestion id policy and extraction rules
//! - HTTP server and logging settings
//! - `KGRAPH_*` environment overrides

mod kgraph_config;
pub mod validation;

pub use kgraph_config::{
    CacheBackend, CacheConfig, GraphConfig, IngestConfig, KgraphConfig, LogConfig, QueryConfig,
    ServerConfig,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
